//! Architecture catalog and type-descriptor resolution.
//!
//! Each family lists its descriptor patterns most specific first, so
//! `MIPS32` is tried before the generic `MIPS`. Patterns are matched as
//! case-sensitive substrings of the full type descriptor produced by file-type
//! identification.

/// One descriptor pattern and the QEMU user-mode targets it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchVariant {
    pub pattern: &'static str,
    pub targets: &'static [&'static str],
}

/// A CPU family with its variants ordered most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchFamily {
    pub name: &'static str,
    pub variants: &'static [ArchVariant],
}

const fn variant(pattern: &'static str, targets: &'static [&'static str]) -> ArchVariant {
    ArchVariant { pattern, targets }
}

const PPC_TARGETS: &[&str] = &["ppc", "ppc64", "ppc64abi32", "ppc64le"];

/// Process-wide read-only catalog.
pub static ARCH_CATALOG: &[ArchFamily] = &[
    ArchFamily {
        name: "arm",
        variants: &[variant("aarch64", &["aarch64"]), variant("ARM", &["aarch64", "arm", "armeb"])],
    },
    ArchFamily {
        name: "mips",
        variants: &[
            variant("MIPS32", &["mipsel", "mips", "mipsn32", "mipsn32el"]),
            variant("MIPS64", &["mips64", "mips64el"]),
            variant("MIPS", &["mipsel", "mips", "mips64", "mips64el", "mipsn32", "mipsn32el"]),
        ],
    },
    ArchFamily {
        name: "x86",
        variants: &[
            variant("80386", &["i386"]),
            variant("80486", &["x86_64", "i386"]),
            variant("x86", &["x86_64", "i386"]),
        ],
    },
    ArchFamily {
        name: "ppc",
        variants: &[variant("PowerPC", PPC_TARGETS), variant("PPC", PPC_TARGETS)],
    },
    ArchFamily { name: "sh", variants: &[variant("Renesas SH", &["sh4", "sh4eb"])] },
];

impl ArchFamily {
    /// First (most specific) variant whose pattern occurs in `descriptor`.
    pub fn resolve(&self, descriptor: &str) -> Option<&'static ArchVariant> {
        self.variants.iter().find(|v| descriptor.contains(v.pattern))
    }
}

/// Look up the target list registered for an exact descriptor pattern.
pub fn targets_for_pattern(pattern: &str) -> Option<&'static [&'static str]> {
    ARCH_CATALOG
        .iter()
        .flat_map(|family| family.variants.iter())
        .find(|v| v.pattern == pattern)
        .map(|v| v.targets)
}

/// Resolve a type descriptor to the ordered list of candidate architectures.
///
/// Within one family only the most specific matching variant contributes.
/// Unrelated families that all match are concatenated in catalog order with
/// duplicates removed. Returns an empty list when nothing matches.
pub fn find_arch_suffixes(descriptor: &str) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for variant in ARCH_CATALOG.iter().filter_map(|family| family.resolve(descriptor)) {
        for target in variant.targets {
            if !out.contains(target) {
                out.push(target);
            }
        }
    }
    out
}
