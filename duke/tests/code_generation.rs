use anyhow::{Context, Result};
use pretty_assertions::assert_eq;
use duke::error::TranslationError;
use duke::frames::{compute_frames, MapHierarchy, NoHierarchy, ObjectFallback, VerificationType};
use duke::pool::{Constant, ConstantPool};
use duke::tree::class::{ClassFile, ClassName};
use duke::tree::method::code::{Code, Instruction};
use duke::WriteOptions;

fn name(name: &str) -> Result<ClassName> {
	ClassName::try_from(name)
}

fn code(class: &ClassFile, method: usize) -> Result<&Code> {
	class.methods.get(method)
		.and_then(|method| method.code.as_ref())
		.context("method has no code")
}

#[test]
fn pool_entries_are_shared() -> Result<()> {
	let object = name("java/lang/Object")?;
	let string = name("java/lang/String")?;

	let mut pool = ConstantPool::new();
	let first = pool.intern(Constant::Class(&object))?;
	assert_eq!(pool.intern(Constant::Class(&string))?, first + 2);
	assert_eq!(pool.intern(Constant::Class(&object))?, first);
	assert_eq!(pool.len(), 4);

	let count = pool.count();
	let long = pool.intern(Constant::Long(7))?;
	assert_eq!(long, count);
	// a long takes up two indices
	assert_eq!(pool.intern(Constant::Integer(7))?, count + 2);
	assert_eq!(pool.intern(Constant::Long(7))?, long);
	assert_eq!(pool.count(), count + 3);
	Ok(())
}

#[test]
fn equal_constants_are_written_once() -> Result<()> {
	let class = duke::text::parse("version 52 0
class demo/Twice extends java/lang/Object {
	static f()V {
			LDC \"twice\"
			POP
			LDC \"twice\"
			POP
			RETURN
	}
}")?;
	let bytes = duke::encode(&class, &WriteOptions::default())?;
	let occurrences = bytes.windows(5).filter(|window| *window == b"twice").count();
	assert_eq!(occurrences, 1);
	Ok(())
}

const MERGE: &str = "version 52 0
class demo/Merge extends java/lang/Object {
	static pick(Z)Ljava/lang/Object; {
			ILOAD 0
			IFEQ L0
			ICONST_1
			INVOKESTATIC java/lang/Integer.valueOf (I)Ljava/lang/Integer;
			ASTORE 1
			GOTO L1
		L0
			LCONST_1
			INVOKESTATIC java/lang/Long.valueOf (J)Ljava/lang/Long;
			ASTORE 1
		L1
			ALOAD 1
			ARETURN
	}
}";

/// The index of the `ALOAD 1` after both branches met.
const JOIN: usize = 9;

#[test]
fn merge_without_hierarchy_fails() -> Result<()> {
	let class = duke::text::parse(MERGE)?;

	let e = compute_frames(&class, &class.methods[0], &NoHierarchy).unwrap_err();
	assert!(matches!(TranslationError::of(&e), Some(TranslationError::Verification { .. })), "{e:?}");

	let options = WriteOptions { compute_frames: true, compute_maxs: true, hierarchy: &NoHierarchy };
	let e = duke::encode(&class, &options).unwrap_err();
	assert!(matches!(TranslationError::of(&e), Some(TranslationError::Verification { .. })), "{e:?}");
	assert_eq!(TranslationError::of(&e).map(TranslationError::kind), Some("verification"));
	Ok(())
}

#[test]
fn merge_widens_to_common_super_class() -> Result<()> {
	let class = duke::text::parse(MERGE)?;

	let mut hierarchy = MapHierarchy::new();
	hierarchy.insert(name("java/lang/Integer")?, name("java/lang/Number")?);
	hierarchy.insert(name("java/lang/Long")?, name("java/lang/Number")?);
	hierarchy.insert(name("java/lang/Number")?, name("java/lang/Object")?);

	let computed = compute_frames(&class, &class.methods[0], &hierarchy)?;
	let frame = computed.frames[JOIN].as_ref().context("join isn't reachable")?;
	assert_eq!(frame.locals, vec![VerificationType::Integer, VerificationType::Object(name("java/lang/Number")?)]);
	assert!(frame.stack.is_empty());
	assert!(computed.required.contains(&JOIN));

	let computed = compute_frames(&class, &class.methods[0], &ObjectFallback)?;
	let frame = computed.frames[JOIN].as_ref().context("join isn't reachable")?;
	assert_eq!(frame.locals[1], VerificationType::Object(name("java/lang/Object")?));

	let options = WriteOptions { compute_frames: true, compute_maxs: true, hierarchy: &hierarchy };
	let decoded = duke::decode(&duke::encode(&class, &options)?)?;
	assert_eq!(code(&decoded, 0)?.max_locals, Some(2));
	Ok(())
}

#[test]
fn far_branches_are_widened() -> Result<()> {
	let mut text = String::from("version 52 0\nclass demo/Far extends java/lang/Object {\n\tstatic f(I)V {\n\t\t\tILOAD 0\n\t\t\tIFEQ L0\n");
	for _ in 0..40000 {
		text.push_str("\t\t\tNOP\n");
	}
	text.push_str("\t\tL0\n\t\t\tRETURN\n\t}\n}\n");
	let class = duke::text::parse(&text)?;

	let bytes = duke::encode(&class, &WriteOptions::default())?;
	assert!(bytes.len() > 40000);

	let decoded = duke::decode(&bytes)?;
	let original = code(&class, 0)?;
	let decoded = code(&decoded, 0)?;

	// the conditional branch is inverted to jump over a `goto_w` to the far target
	assert_eq!(decoded.instructions.len(), original.instructions.len() + 1);
	assert!(matches!(decoded.instructions[1].instruction, Instruction::IfNe(_)), "{:?}", decoded.instructions[1]);
	let Instruction::Goto(target) = decoded.instructions[2].instruction else {
		panic!("expected a goto, got {:?}", decoded.instructions[2]);
	};
	let last = decoded.instructions.last().context("no instructions")?;
	assert_eq!(last.label, Some(target));
	assert_eq!(last.instruction, Instruction::Return);
	Ok(())
}

#[test]
fn max_stack_is_computed() -> Result<()> {
	let class = duke::text::parse("version 52 0
class demo/Add extends java/lang/Object {
	static f()V {
			ICONST_1
			ICONST_2
			IADD
			RETURN
	}
}")?;
	assert_eq!(code(&class, 0)?.max_stack, None);

	let decoded = duke::decode(&duke::encode(&class, &WriteOptions::default())?)?;
	let code = code(&decoded, 0)?;
	assert!(code.max_stack.is_some_and(|max_stack| max_stack >= 2), "{:?}", code.max_stack);
	assert_eq!(code.max_locals, Some(0));
	Ok(())
}

#[test]
fn explicit_maximums_are_kept() -> Result<()> {
	let class = duke::text::parse("version 52 0
class demo/Add extends java/lang/Object {
	static f()V {
			ICONST_1
			ICONST_2
			IADD
			POP
			RETURN
		MAXSTACK = 10
		MAXLOCALS = 4
	}
}")?;
	let decoded = duke::decode(&duke::encode(&class, &WriteOptions::default())?)?;
	let code = code(&decoded, 0)?;
	assert_eq!((code.max_stack, code.max_locals), (Some(10), Some(4)));
	Ok(())
}
