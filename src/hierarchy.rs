use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, trace};
use walkdir::WalkDir;
use duke::frames::HierarchyOracle;
use duke::tree::class::{ClassFile, ClassName};

/// Answers hierarchy questions by reading the super classes out of class files in directories.
///
/// The directories are indexed up front, but a class file is only read the first time it's needed.
#[derive(Debug)]
pub(crate) struct ClassPathHierarchy {
	/// The class file for each class name, from the first directory that has one.
	files: HashMap<String, PathBuf>,
	/// The super class of each class looked at so far, [`None`] for `java/lang/Object` and for unknown classes.
	super_classes: RefCell<HashMap<ClassName, Option<ClassName>>>,
}

impl ClassPathHierarchy {
	pub(crate) fn new(roots: &[PathBuf]) -> Result<ClassPathHierarchy> {
		let mut files = HashMap::new();
		for root in roots {
			for entry in WalkDir::new(root).follow_links(true) {
				let entry = entry.with_context(|| anyhow!("failed to walk class path directory {root:?}"))?;
				let path = entry.path();
				if !entry.file_type().is_file() || path.extension().map_or(true, |extension| extension != "class") {
					continue;
				}
				let relative = path.strip_prefix(root)
					.with_context(|| anyhow!("{path:?} isn't in {root:?}"))?
					.with_extension("");
				let name: Vec<_> = relative.components()
					.map(|component| component.as_os_str().to_string_lossy())
					.collect();
				files.entry(name.join("/")).or_insert_with(|| path.to_owned());
			}
		}
		debug!("found {} class files on the class path", files.len());

		Ok(ClassPathHierarchy { files, super_classes: RefCell::new(HashMap::new()) })
	}

	/// Makes a class known without reading it from the class path.
	pub(crate) fn add(&mut self, class: &ClassFile) {
		self.super_classes.get_mut().insert(class.name.clone(), class.super_class.clone());
	}

	/// Finds the super class, reading the class file if needed. Returns [`None`] for unknown classes.
	fn super_class(&self, class: &ClassName) -> Result<Option<ClassName>> {
		if let Some(super_class) = self.super_classes.borrow().get(class) {
			return Ok(super_class.clone());
		}

		let super_class = match self.files.get(class.as_str()) {
			Some(path) => {
				trace!("reading {path:?} for the super class of {class}");
				let bytes = std::fs::read(path)
					.with_context(|| anyhow!("failed to read {path:?}"))?;
				let read = duke::decode(&bytes)
					.with_context(|| anyhow!("failed to read class file {path:?} from the class path"))?;
				if read.name != *class {
					bail!("class file {path:?} contains class {}, expected {class}", read.name);
				}
				read.super_class
			},
			None => None,
		};
		self.super_classes.borrow_mut().insert(class.clone(), super_class.clone());
		Ok(super_class)
	}

	/// The class followed by all its super classes, or [`None`] if the chain doesn't end in `java/lang/Object`.
	fn chain(&self, class: &ClassName) -> Result<Option<Vec<ClassName>>> {
		let object = ClassName::java_lang_object();
		let mut chain = vec![class.clone()];
		let mut current = class.clone();
		while current != object {
			match self.super_class(&current)? {
				Some(super_class) => {
					if chain.contains(&super_class) {
						bail!("class {super_class} is its own super class");
					}
					chain.push(super_class.clone());
					current = super_class;
				},
				None => {
					debug!("class {current} isn't on the class path");
					return Ok(None);
				},
			}
		}
		Ok(Some(chain))
	}
}

impl HierarchyOracle for ClassPathHierarchy {
	fn common_super_class(&self, a: &ClassName, b: &ClassName) -> Result<Option<ClassName>> {
		let Some(chain_a) = self.chain(a)? else {
			return Ok(None);
		};
		let Some(chain_b) = self.chain(b)? else {
			return Ok(None);
		};
		Ok(chain_b.into_iter().find(|class| chain_a.contains(class)))
	}
}

#[cfg(test)]
mod testing {
	use std::path::PathBuf;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use duke::frames::HierarchyOracle;
	use duke::tree::class::{ClassAccess, ClassFile, ClassName};
	use duke::tree::version::Version;
	use duke::WriteOptions;
	use crate::hierarchy::ClassPathHierarchy;

	fn class(name: &str, super_class: &str) -> Result<ClassFile> {
		Ok(ClassFile::new(Version::V1_8, ClassAccess::from(0x0021), name.try_into()?, Some(super_class.try_into()?), Vec::new()))
	}

	fn name(name: &str) -> Result<ClassName> {
		ClassName::try_from(name)
	}

	#[test]
	fn reads_class_files() -> Result<()> {
		let root = std::env::temp_dir().join(format!("dukeasm-hierarchy-{}", std::process::id()));
		std::fs::create_dir_all(root.join("a"))?;
		std::fs::write(root.join("a/Animal.class"), duke::encode(&class("a/Animal", "java/lang/Object")?, &WriteOptions::default())?)?;
		std::fs::write(root.join("a/Cat.class"), duke::encode(&class("a/Cat", "a/Animal")?, &WriteOptions::default())?)?;

		let mut hierarchy = ClassPathHierarchy::new(&[PathBuf::from(&root)])?;
		hierarchy.add(&class("b/Dog", "a/Animal")?);

		assert_eq!(hierarchy.common_super_class(&name("a/Cat")?, &name("b/Dog")?)?, Some(name("a/Animal")?));
		assert_eq!(hierarchy.common_super_class(&name("a/Cat")?, &name("a/Animal")?)?, Some(name("a/Animal")?));
		assert_eq!(hierarchy.common_super_class(&name("a/Cat")?, &name("java/lang/Object")?)?, Some(name("java/lang/Object")?));
		assert_eq!(hierarchy.common_super_class(&name("a/Cat")?, &name("c/Unknown")?)?, None);

		std::fs::remove_dir_all(&root)?;
		Ok(())
	}
}
