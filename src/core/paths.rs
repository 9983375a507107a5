//! Shared path manipulation utilities.

use std::path::{Component, Path, is_separator};

/// Whether a stored path value carries no location at all.
///
/// NULL, empty and whitespace-only values are all "no path".
pub fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|raw| raw.trim().is_empty())
}

/// Whether `path` is absolute and free of `.`/`..` components that would make a
/// lexical comparison disagree with what the filesystem resolves.
///
/// Repeated separators and interior `.` segments are already folded away by
/// [`Path::components`]; only `..` changes meaning.
pub fn is_lexically_clean(path: &Path) -> bool {
    path.is_absolute()
        && path
            .components()
            .all(|component| !matches!(component, Component::ParentDir))
}

/// Whether the raw path text ends in a separator or in a separator followed by
/// `.`.
///
/// [`Path::components`] drops both, yet the filesystem insists the final
/// component be a directory (`a.pdf/` fails with `ENOTDIR`).
pub fn ends_with_directory_marker(path: &Path) -> bool {
    let bytes = path.as_os_str().as_encoded_bytes();
    let ends_in_separator =
        |raw: &[u8]| raw.last().is_some_and(|&b| b.is_ascii() && is_separator(char::from(b)));
    ends_in_separator(bytes) || bytes.strip_suffix(b".").is_some_and(ends_in_separator)
}

/// Whether `path` is `root` or lies lexically beneath it.
///
/// Both sides are compared component-wise, so trailing slashes and doubled
/// separators do not matter.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
