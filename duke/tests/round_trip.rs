use anyhow::{Context, Result};
use pretty_assertions::assert_eq;
use duke::tree::attribute::Attribute;
use duke::tree::class::ClassFile;
use duke::WriteOptions;

const COUNTER: &str = include_str!("data/Counter.jasm");

fn counter() -> Result<ClassFile> {
	duke::text::parse(COUNTER)
}

#[test]
fn decode_encode() -> Result<()> {
	// every method gives its maximums, so nothing is added when encoding
	let class = counter()?;
	let bytes = duke::encode(&class, &WriteOptions::default())?;
	assert_eq!(&bytes[..4], &[0xca, 0xfe, 0xba, 0xbe]);

	let decoded = duke::decode(&bytes)?;
	assert_eq!(decoded, class);

	// and the bytes are stable from then on
	assert_eq!(duke::encode(&decoded, &WriteOptions::default())?, bytes);
	Ok(())
}

#[test]
fn parse_print() -> Result<()> {
	let bytes = duke::encode(&counter()?, &WriteOptions::default())?;
	let decoded = duke::decode(&bytes)?;

	let printed = duke::text::print(&decoded)?;
	assert_eq!(duke::text::parse(&printed)?, decoded);
	Ok(())
}

#[test]
fn print_is_idempotent() -> Result<()> {
	let printed = duke::text::print(&counter()?)?;
	let reprinted = duke::text::print(&duke::text::parse(&printed)?)?;
	assert_eq!(reprinted, printed);

	// the canonical text is also what a disassembly of the class file gives
	let bytes = duke::encode(&counter()?, &WriteOptions::default())?;
	assert_eq!(duke::text::print(&duke::decode(&bytes)?)?, printed);
	Ok(())
}

#[test]
fn unknown_attributes_survive() -> Result<()> {
	let bytes = duke::encode(&counter()?, &WriteOptions::default())?;
	let decoded = duke::decode(&bytes)?;

	assert_eq!(decoded.attributes, vec![Attribute::new("Custom", vec![0x01, 0x02])]);
	assert_eq!(decoded.fields[0].attributes, vec![Attribute::new("FieldNote", Vec::new())]);
	assert_eq!(decoded.methods[1].attributes, vec![Attribute::new("MethodNote", vec![0x7f])]);

	let code = decoded.methods[2].code.as_ref().context("compareTo has no code")?;
	assert_eq!(code.attributes, vec![Attribute::new("CodeNote", vec![0xff])]);
	Ok(())
}

#[test]
fn unknown_attributes_are_written_as_given() -> Result<()> {
	let mut class = counter()?;
	class.attributes.push(Attribute::new("Opaque", (0..=255).collect()));

	let bytes = duke::encode(&class, &WriteOptions::default())?;
	let opaque: Vec<u8> = (0..=255).collect();
	assert!(bytes.windows(opaque.len()).any(|window| window == opaque));

	assert_eq!(duke::decode(&bytes)?.attributes, class.attributes);
	Ok(())
}
