/// Drop the tag from `reference` and pin it to `digest`.
///
/// A trailing `:segment` only counts as a tag when it holds no `/`, so a
/// registry port (`host:5000/repo`) is never mistaken for one.
pub fn pin_to_digest(reference: &str, digest: &str) -> String {
    let name = match reference.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => name,
        _ => reference,
    };
    let name = name.split_once('@').map(|(n, _)| n).unwrap_or(name);
    format!("{}@{}", name, digest)
}
