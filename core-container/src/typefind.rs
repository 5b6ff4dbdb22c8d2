//! Recognizing packages from their first bytes.

/// Media type of a legacy package.
pub const UNREAL_PACKAGE_MEDIA_TYPE: &str = "application/x-unreal";

/// Media type of the extracted module; the tracker format goes in `type`.
pub const MODULE_MEDIA_TYPE: &str = "audio/x-mod";

/// File extensions packages with music are usually found under.
pub const PACKAGE_EXTENSIONS: &[&str] = &["umx"];

const SIGNATURE_BYTES: [u8; 4] = [0xC1, 0x83, 0x2A, 0x9E];

/// How sure a suggestion is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Probability {
    Possible,
    Likely,
    Certain,
}

/// Result of type-finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSuggestion {
    pub media_type: &'static str,
    pub probability: Probability,
}

/// Returns `true` if `data` starts with the package signature.
pub fn looks_like_package(data: &[u8]) -> bool {
    data.starts_with(&SIGNATURE_BYTES)
}

/// Suggest a media type for `data`, `None` when it is not a package.
///
/// The signature alone is not conclusive: packages without music share it.
pub fn type_find(data: &[u8]) -> Option<TypeSuggestion> {
    looks_like_package(data).then_some(TypeSuggestion {
        media_type: UNREAL_PACKAGE_MEDIA_TYPE,
        probability: Probability::Likely,
    })
}

/// Full media type string for an extracted module, e.g. `audio/x-mod, type=it`.
pub fn module_caps(module_type: &str) -> String {
    format!("{}, type={}", MODULE_MEDIA_TYPE, module_type)
}
