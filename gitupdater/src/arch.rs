use itertools::Itertools;
use lazy_regex::{regex_is_match, Lazy};
use platforms::Arch;
use regex::Regex;

const X86_32_LABELS: &[&str] = &["32bit", "32-bit", "x86", "i386", "i586", "i686", "386"];
const X86_64_LABELS: &[&str] = &["64bit", "64-bit", "x64", "x86_64", "x86-64", "amd64"];
const ARM_LABELS: &[&str] = &[
    "arm", "armel", "armhf", "armv6", "armv7", "armv7l", "armv8", "arm64", "arm64e", "aarch64",
];

// ARM builds carry too many version and ABI suffixes to list them all, so they match this family
// instead of a fixed list.
const ARM_FAMILY: &str = r"arm(?:v\d+l?|hf|el|64e?)?|aarch_?64";

// Longer labels come first so that at any given position `x86_64` wins over `x86`. The ARM family
// never shares a prefix with the x86 labels.
static KNOWN_LABELS_RE: Lazy<Regex> = Lazy::new(|| {
    let alternation = X86_32_LABELS
        .iter()
        .chain(X86_64_LABELS)
        .sorted_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)))
        .map(|l| regex::escape(l))
        .join("|");
    Regex::new(&format!("(?i:{alternation}|{ARM_FAMILY})")).unwrap()
});

fn is_arm_label(label: &str) -> bool {
    regex_is_match!(r"^(?:arm(?:v\d+l?|hf|el|64e?)?|aarch_?64)$"i, label)
}

/// A group of interchangeable CPU architecture labels. Asset names are matched against every
/// label in the group, so `x86_64`, `amd64`, and `x64` all mean the same thing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArchVariant {
    X86,
    X86_64,
    Arm,
    /// An architecture with no known synonyms. It only matches its own name.
    Other(String),
}

impl ArchVariant {
    /// Finds the variant group that contains `label`. Unknown labels become a group of one.
    #[must_use]
    pub fn from_label(label: &str) -> ArchVariant {
        let label = label.to_lowercase();
        if X86_32_LABELS.contains(&label.as_str()) {
            ArchVariant::X86
        } else if X86_64_LABELS.contains(&label.as_str()) {
            ArchVariant::X86_64
        } else if is_arm_label(&label) {
            ArchVariant::Arm
        } else {
            ArchVariant::Other(label)
        }
    }

    // `platforms` adds variants over time.
    #[allow(clippy::wildcard_enum_match_arm)]
    pub(crate) fn from_platform_arch(arch: Arch) -> ArchVariant {
        match arch {
            Arch::X86 => ArchVariant::X86,
            Arch::X86_64 => ArchVariant::X86_64,
            Arch::Arm | Arch::AArch64 => ArchVariant::Arm,
            other => ArchVariant::Other(other.as_str().to_lowercase()),
        }
    }

    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        match self {
            ArchVariant::X86 => X86_32_LABELS.to_vec(),
            ArchVariant::X86_64 => X86_64_LABELS.to_vec(),
            ArchVariant::Arm => ARM_LABELS.to_vec(),
            ArchVariant::Other(label) => vec![label.as_str()],
        }
    }

    /// Returns true if `name` contains any label from this group as a standalone token.
    pub(crate) fn name_matches(&self, name: &str) -> bool {
        match self {
            ArchVariant::Other(label) => contains_token(&name.to_lowercase(), label),
            ArchVariant::Arm => known_labels_in(name).any(|found| is_arm_label(&found)),
            ArchVariant::X86 | ArchVariant::X86_64 => {
                let labels = self.labels();
                known_labels_in(name).any(|found| labels.contains(&found.as_str()))
            }
        }
    }
}

fn known_labels_in(name: &str) -> impl Iterator<Item = String> + '_ {
    KNOWN_LABELS_RE
        .find_iter(name)
        .filter(|m| is_token_boundary(name, m.start(), m.end()))
        .map(|m| m.as_str().to_lowercase())
}

fn contains_token(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack
        .match_indices(needle)
        .any(|(start, m)| is_token_boundary(haystack, start, start + m.len()))
}

fn is_token_boundary(s: &str, start: usize, end: usize) -> bool {
    let before = s[..start].chars().next_back();
    let after = s[end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_alphanumeric())
        && !after.is_some_and(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::x64("x64", ArchVariant::X86_64)]
    #[case::amd64("AMD64", ArchVariant::X86_64)]
    #[case::i686("i686", ArchVariant::X86)]
    #[case::aarch64("aarch64", ArchVariant::Arm)]
    #[case::armv7l("armv7l", ArchVariant::Arm)]
    #[case::riscv("riscv64", ArchVariant::Other("riscv64".to_string()))]
    fn from_label(#[case] label: &str, #[case] expect: ArchVariant) {
        assert_eq!(ArchVariant::from_label(label), expect);
    }

    #[rstest]
    #[case::x64_name(ArchVariant::X86_64, "bar-1.2.0-windows-x64.zip", true)]
    #[case::x86_64_name(ArchVariant::X86_64, "bar_linux_x86_64.tar.gz", true)]
    #[case::x86_name_for_64_bit_host(ArchVariant::X86_64, "bar-1.2.0-windows-x86.zip", false)]
    #[case::x86_64_name_for_32_bit_host(ArchVariant::X86, "bar_linux_x86_64.tar.gz", false)]
    #[case::i686_name(ArchVariant::X86, "bar-linux-i686.tar.gz", true)]
    #[case::arm64_name(ArchVariant::Arm, "bar-darwin-arm64.tar.gz", true)]
    #[case::armv6_name(ArchVariant::Arm, "bar-linux-armv6.tar.gz", true)]
    #[case::armv7l_name(ArchVariant::Arm, "bar-linux-armv7l.tar.gz", true)]
    #[case::armel_name(ArchVariant::Arm, "bar-linux-armel.tar.gz", true)]
    #[case::arm64e_name(ArchVariant::Arm, "bar-darwin-arm64e.tar.gz", true)]
    #[case::aarch_64_name(ArchVariant::Arm, "bar_linux_aarch_64.zip", true)]
    #[case::x86_64_name_for_arm_host(ArchVariant::Arm, "bar-linux-x86_64.tar.gz", false)]
    #[case::label_inside_word(ArchVariant::Arm, "charming-linux.tar.gz", false)]
    #[case::other_arch(ArchVariant::Other("riscv64".to_string()), "bar-linux-riscv64.tar.gz", true)]
    #[case::other_arch_inside_word(ArchVariant::Other("mips".to_string()), "bar-linux-mipsel.tar.gz", false)]
    fn name_matches(#[case] arch: ArchVariant, #[case] name: &str, #[case] expect: bool) {
        assert_eq!(arch.name_matches(name), expect, "{arch:?} vs {name}");
    }

    #[test]
    fn maps_platform_arches() {
        assert_eq!(
            ArchVariant::from_platform_arch(Arch::AArch64),
            ArchVariant::Arm
        );
        assert_eq!(
            ArchVariant::from_platform_arch(Arch::X86_64),
            ArchVariant::X86_64
        );
        assert_eq!(
            ArchVariant::from_platform_arch(Arch::S390X),
            ArchVariant::Other("s390x".to_string())
        );
    }
}
