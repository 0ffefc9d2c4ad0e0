use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Represents a class file version.
///
/// Take a look at [the list of class file versions](https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.1-200-B.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
	pub major: u16,
	pub minor: u16,
}

impl Version {
	pub const V1_1: Version = Version::new(45, 3);
	pub const V1_5: Version = Version::new(49, 0);
	pub const V1_6: Version = Version::new(50, 0);
	pub const V1_7: Version = Version::new(51, 0);
	pub const V1_8: Version = Version::new(52, 0);
	pub const V11: Version = Version::new(55, 0);
	pub const V17: Version = Version::new(61, 0);
	pub const V21: Version = Version::new(65, 0);
	pub const V23: Version = Version::new(67, 0);

	/// The newest version that can be read and written.
	pub const LATEST: Version = Version::V23;

	pub const fn new(major: u16, minor: u16) -> Version {
		Version { major, minor }
	}

	/// Class files of this version or newer get a `StackMapTable` attribute in each `Code` attribute.
	pub fn has_stack_map_frames(self) -> bool {
		self >= Version::V1_6
	}

	/// Class files before this version may use `jsr` and `ret`.
	pub fn allows_subroutines(self) -> bool {
		self < Version::V1_7
	}
}

impl Default for Version {
	fn default() -> Self {
		Version::V1_8
	}
}

impl Display for Version {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}", self.major, self.minor)
	}
}

impl PartialOrd for Version {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Version {
	fn cmp(&self, other: &Self) -> Ordering {
		self.major.cmp(&other.major)
			.then_with(|| self.minor.cmp(&other.minor))
	}
}

#[cfg(test)]
mod testing {
	use crate::tree::version::Version;

	#[test]
	fn test_cmp() {
		assert!(Version::V17 < Version::V21);
		assert!(Version::V21 < Version::V23);
		assert!(Version::V21 <= Version::V21);
		assert!(Version::V21 >= Version::V11);

		assert!(Version::V21 < Version::new(65, 1));
		assert!(Version::new(65, 2) > Version::new(65, 1));
	}

	#[test]
	fn frames_and_subroutines() {
		assert!(!Version::V1_5.has_stack_map_frames());
		assert!(Version::V1_6.has_stack_map_frames());
		assert!(Version::V1_6.allows_subroutines());
		assert!(!Version::V1_7.allows_subroutines());
	}
}
