//! The textual format of class files.
//!
//! A class is written as a line based listing: a few header directives, the class header, and then the members. Method
//! bodies list one instruction per line, with labels (`L0`, `L1`, ...) on their own lines. [`print`] always writes the
//! canonical form, and [`parse`] accepts it back, so that `parse(print(class)) == class` for every class with canonical
//! labels.
//!
//! Names that can't be written as a single word are quoted like strings. This covers names with whitespace, `//` or one
//! of `{ } , = : "`. A method header with a quoted name puts the descriptor after it, as in `static "my test" ()V`.

mod lexer;
mod parser;
mod printer;

use std::io::Write;
use anyhow::{Context, Result};
use crate::error::{OrTranslationError, TranslationError};
use crate::tree::class::ClassFile;

/// Parses a class from the textual format.
///
/// Failures are [`TranslationError::Syntax`] errors, or [`TranslationError::UnresolvedLabel`] errors for labels that
/// are used but never bound in a method body.
pub fn parse(text: &str) -> Result<ClassFile> {
	parser::parse(text)
}

/// Prints the class in the canonical textual format.
pub fn print(class: &ClassFile) -> Result<String> {
	let mut vec = Vec::new();
	write(class, &mut vec)?;
	String::from_utf8(vec).context("printed class isn't valid UTF-8")
}

/// Writes the class in the canonical textual format.
pub fn write(class: &ClassFile, w: &mut impl Write) -> Result<()> {
	printer::write(class, w)
		.or_translation_error(|| TranslationError::Encoding)
}

#[cfg(test)]
mod testing {
	use anyhow::{Context, Result};
	use pretty_assertions::assert_eq;
	use crate::text::{parse, print};
	use crate::tree::class::ClassName;
	use crate::tree::field::{ConstantValue, FieldDescriptor, FieldName};
	use crate::tree::method::code::{Instruction, InstructionListEntry, Loadable};
	use crate::tree::method::MethodName;
	use crate::tree::type_annotation::{TargetInfoClass, TargetInfoCode};
	use crate::WriteOptions;

	const SAMPLE: &str = r#"version 52 0
source "Sample.java"
signature "Ljava/lang/Object;Ljava/lang/Runnable;"
@Lpkg/Marker; { }
public super class pkg/Sample extends java/lang/Object implements java/lang/Runnable {
	nesthost pkg/Outer
	innerclass pkg/Sample$1 static

	invisible @Lpkg/Hidden; { level = 3, tag = char 65, kinds = array { class V, class [I }, nested = @Lpkg/N; { } }
	public static final Ljava/lang/String; NAME = "sample é"

	private static final D RATE = 0.25D

	public <init>()V {
		L0
			LINENUMBER 3 L0
			aload 0
			invokespecial java/lang/Object.<init> ()V
			return
		L1
		LOCALVARIABLE this Lpkg/Sample; L0 L1 0
	}

	public run()V {
		L0
			getstatic java/lang/System.out : Ljava/io/PrintStream;
			ldc "hi"
			invokevirtual java/io/PrintStream.println (Ljava/lang/String;)V
		L1
			goto L3
		L2
			astore 1
		L3
			return
		TRYCATCHBLOCK L0 L1 L2 java/lang/Exception
	}

	static pick(I)I {
			iload 0
			tableswitch 1 { L0, L1 } default L2
		L0
			iconst_1
			ireturn
		L1
			ldc 2L
			l2i
			ireturn
		L2
			iload 0
			lookupswitch { -5 : L0, 100 : L1 } default L3
		L3
			ldc 1.5F
			f2i
			ireturn
	}

	static lambda()Ljava/lang/Runnable; {
			invokedynamic run ()Ljava/lang/Runnable; handle H_INVOKESTATIC java/lang/invoke/LambdaMetafactory.metafactory (Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite; { ()V, handle H_INVOKESTATIC pkg/Sample.lambda$0 ()V, ()V }
			areturn
		MAXSTACK = 1
		MAXLOCALS = 0
		attribute "Custom" "cafe"
	}
}
"#;

	const ANNOTATED: &str = r#"version 61 0
type typeparam 0 @Lpkg/T; { }
type typebound 0 1 path [* @Lpkg/T; { }
invisible type implements 0 path 0;. @Lpkg/T; { }
public final super class pkg/Point extends java/lang/Record implements java/lang/Comparable {
	record {
		signature "Ljava/util/List<Ljava/lang/String;>;"
		@Lpkg/C; { }
		type field path 0; @Lpkg/T; { }
		Ljava/util/List; names
		invisible type field @Lpkg/T; { }
		I "odd name"
	}

	type field @Lpkg/T; { }
	private final I x

	type return path [ @Lpkg/T; { }
	type receiver @Lpkg/T; { }
	type throws 0 @Lpkg/T; { }
	invisible type param 1 @Lpkg/T; { }
	params 2
	param 1 @Lpkg/P; { }
	param 1 @Lpkg/Q; { }
	invisible params 1
	parameters { a final, - synthetic, "-" mandated, "b c" }
	public run(IIII)V throws java/lang/Exception {
		L0
			aload 0
		L1
			instanceof java/lang/Runnable
			pop
		L2
			goto L4
		L3
			astore 5
		L4
			return
		LOCALVARIABLE x I L0 L4 1
		TRYCATCHBLOCK L0 L2 L3 java/lang/Exception
		TYPEANNOTATION local { L0 L4 1, L1 L2 2 } @Lpkg/T; { }
		TYPEANNOTATION instanceof L1 path * @Lpkg/T; { }
		TYPEANNOTATION invisible catch 0 @Lpkg/T; { }
	}

	default array { "a", enum Lpkg/E; B }
	parameters { }
	public abstract value()[Ljava/lang/String;
}
"#;

	#[test]
	fn annotated_round_trip() -> Result<()> {
		let class = parse(ANNOTATED)?;
		let components = class.record_components.as_ref().context("class has no record components")?;
		assert_eq!(components.len(), 2);
		assert_eq!(components[0].type_annotations.visible.len(), 1);
		assert_eq!(components[1].name.as_str(), "odd name");
		assert_eq!(class.type_annotations.visible.len(), 2);
		assert_eq!(class.type_annotations.invisible[0].type_reference, TargetInfoClass::Implements { index: 0 });

		let run = &class.methods[0];
		assert_eq!(run.type_annotations.visible.len(), 3);
		let visible = run.parameter_annotations.visible.as_ref().context("no visible parameter annotations")?;
		assert_eq!(visible.iter().map(Vec::len).collect::<Vec<_>>(), vec![0, 2]);
		assert_eq!(run.parameter_annotations.invisible, Some(vec![Vec::new()]));
		let parameters = run.parameters.as_ref().context("no method parameters")?;
		assert_eq!(parameters[1].name, None);
		assert_eq!(parameters[2].name.as_deref(), Some("-"));
		assert!(parameters[2].flags.is_mandated);
		assert_eq!(class.methods[1].parameters, Some(Vec::new()));
		assert!(class.methods[1].annotation_default.is_some());

		let code = run.code.as_ref().context("method has no code")?;
		assert_eq!(code.type_annotations.visible.len(), 2);
		assert_eq!(code.type_annotations.invisible[0].type_reference, TargetInfoCode::ExceptionParameter { index: 0 });

		let printed = print(&class)?;
		assert_eq!(parse(&printed)?, class);
		assert_eq!(print(&parse(&printed)?)?, printed);
		Ok(())
	}

	#[test]
	fn annotated_text_to_binary_and_back() -> Result<()> {
		let mut class = parse(ANNOTATED)?;
		let bytes = crate::encode(&class, &WriteOptions::default())?;
		let mut decoded = crate::decode(&bytes)?;
		for method in class.methods.iter_mut().chain(decoded.methods.iter_mut()) {
			if let Some(code) = &mut method.code {
				code.max_stack = None;
				code.max_locals = None;
			}
		}
		assert_eq!(print(&decoded)?, print(&class)?);
		Ok(())
	}

	#[test]
	fn empty_record() -> Result<()> {
		let class = parse("final class A extends java/lang/Record {\n\trecord {\n\t}\n}\n")?;
		assert_eq!(class.record_components, Some(Vec::new()));
		assert!(print(&class)?.contains("\trecord {\n\t}\n"));
		Ok(())
	}

	#[test]
	fn parse_print_round_trip() -> Result<()> {
		let class = parse(SAMPLE)?;
		let printed = print(&class)?;
		assert_eq!(parse(&printed)?, class);
		Ok(())
	}

	#[test]
	fn printing_is_idempotent() -> Result<()> {
		let printed = print(&parse(SAMPLE)?)?;
		assert_eq!(print(&parse(&printed)?)?, printed);
		Ok(())
	}

	#[test]
	fn names_with_spaces_round_trip() -> Result<()> {
		let mut class = parse(SAMPLE)?;
		class.name = ClassName::try_from("pkg/My Sample")?;
		class.fields[0].name = FieldName::try_from("the name")?;
		class.methods[1].name = MethodName::try_from("my test")?;
		let code = class.methods[0].code.as_mut().context("constructor has no code")?;
		code.local_variables[0].name = "this one".to_owned();
		code.local_variables[0].descriptor = Some(FieldDescriptor::try_from("Lpkg/My Sample;")?);
		code.instructions.insert(0, InstructionListEntry::new(Instruction::Ldc(Loadable::Class(ClassName::try_from("pkg/My Sample")?))));
		code.instructions.insert(1, InstructionListEntry::new(Instruction::Pop));

		let printed = print(&class)?;
		assert!(printed.contains("class \"pkg/My Sample\" extends"), "{printed}");
		assert!(printed.contains("\tpublic \"my test\" ()V {"), "{printed}");
		assert!(printed.contains("LDC \"pkg/My Sample\".class"), "{printed}");
		assert_eq!(parse(&printed)?, class);
		Ok(())
	}

	#[test]
	fn nan_bits_round_trip() -> Result<()> {
		let text = "class A extends java/lang/Object {\n\tstatic final F X = NaN(0x7f800001)F\n\tstatic f()D {\n\t\t\tldc NaN(0x7ff0000000000001)D\n\t\t\tdreturn\n\t}\n}\n";
		let class = parse(text)?;
		let printed = print(&class)?;
		assert!(printed.contains("X = NaN(0x7f800001)F"), "{printed}");
		assert!(printed.contains("LDC NaN(0x7ff0000000000001)D"), "{printed}");

		let bytes = crate::encode(&parse(&printed)?, &WriteOptions::default())?;
		let decoded = crate::decode(&bytes)?;
		assert!(matches!(decoded.fields[0].constant_value, Some(ConstantValue::Float(x)) if x.to_bits() == 0x7f800001));
		let code = decoded.methods[0].code.as_ref().context("method has no code")?;
		assert!(matches!(code.instructions[0].instruction, Instruction::Ldc(Loadable::Double(x)) if x.to_bits() == 0x7ff0000000000001));
		assert!(print(&decoded)?.contains("LDC NaN(0x7ff0000000000001)D"));
		Ok(())
	}

	#[test]
	fn canonical_form() -> Result<()> {
		let text = "class a/B {\n\tstatic f()V {\n\t\t\tgoto L9\n\t\tL9\n\t\t\treturn\n\t}\n}\n";
		assert_eq!(print(&parse(text)?)?, "version 52 0\nclass a/B {\n\tstatic f()V {\n\t\t\tGOTO L0\n\t\tL0\n\t\t\tRETURN\n\t}\n}\n");
		Ok(())
	}

	#[test]
	fn text_to_binary_and_back() -> Result<()> {
		let mut class = parse(SAMPLE)?;
		let bytes = crate::encode(&class, &WriteOptions::default())?;
		let mut decoded = crate::decode(&bytes)?;

		// the decoded methods carry the computed maximums
		for method in class.methods.iter_mut().chain(decoded.methods.iter_mut()) {
			if let Some(code) = &mut method.code {
				code.max_stack = None;
				code.max_locals = None;
			}
		}
		assert_eq!(print(&decoded)?, print(&class)?);
		Ok(())
	}
}
