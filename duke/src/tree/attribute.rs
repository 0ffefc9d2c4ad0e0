/// An attribute that's not read into structured data. The contents are kept as they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name: String,
	pub bytes: Vec<u8>,
}

impl Attribute {
	pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Attribute {
		Attribute { name: name.into(), bytes }
	}
}
