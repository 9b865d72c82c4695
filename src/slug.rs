//! Vietnamese-aware ASCII slug generation.
//!
//! Registry detail URLs embed the business name as a lowercase ASCII slug.
//! Vietnamese text needs two folds that generic lowercasing does not give
//! us: stripping the tonal/vowel diacritics, and mapping đ/Đ to plain "d"
//! (đ is a distinct letter, not a combining mark). The fold table below
//! enumerates every accented vowel form; anything not in the table and not
//! already ASCII alphanumeric becomes a separator.

/// Lowercase Vietnamese characters and their ASCII base letters. Uppercase
/// input is lowercased before lookup, so only lowercase forms appear here.
const VIETNAMESE_FOLD: &[(char, char)] = &[
    // a
    ('à', 'a'), ('á', 'a'), ('ả', 'a'), ('ã', 'a'), ('ạ', 'a'),
    ('ă', 'a'), ('ằ', 'a'), ('ắ', 'a'), ('ẳ', 'a'), ('ẵ', 'a'), ('ặ', 'a'),
    ('â', 'a'), ('ầ', 'a'), ('ấ', 'a'), ('ẩ', 'a'), ('ẫ', 'a'), ('ậ', 'a'),
    // e
    ('è', 'e'), ('é', 'e'), ('ẻ', 'e'), ('ẽ', 'e'), ('ẹ', 'e'),
    ('ê', 'e'), ('ề', 'e'), ('ế', 'e'), ('ể', 'e'), ('ễ', 'e'), ('ệ', 'e'),
    // i
    ('ì', 'i'), ('í', 'i'), ('ỉ', 'i'), ('ĩ', 'i'), ('ị', 'i'),
    // o
    ('ò', 'o'), ('ó', 'o'), ('ỏ', 'o'), ('õ', 'o'), ('ọ', 'o'),
    ('ô', 'o'), ('ồ', 'o'), ('ố', 'o'), ('ổ', 'o'), ('ỗ', 'o'), ('ộ', 'o'),
    ('ơ', 'o'), ('ờ', 'o'), ('ớ', 'o'), ('ở', 'o'), ('ỡ', 'o'), ('ợ', 'o'),
    // u
    ('ù', 'u'), ('ú', 'u'), ('ủ', 'u'), ('ũ', 'u'), ('ụ', 'u'),
    ('ư', 'u'), ('ừ', 'u'), ('ứ', 'u'), ('ử', 'u'), ('ữ', 'u'), ('ự', 'u'),
    // y
    ('ỳ', 'y'), ('ý', 'y'), ('ỷ', 'y'), ('ỹ', 'y'), ('ỵ', 'y'),
    // đ is a letter of its own
    ('đ', 'd'),
];

fn fold_char(c: char) -> char {
    VIETNAMESE_FOLD
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or(c)
}

/// Build a URL slug from a (typically Vietnamese) display name: lowercase,
/// fold diacritics and đ to ASCII, collapse every non-alphanumeric run to a
/// single hyphen, trim hyphens from both ends. Deterministic; empty input
/// yields an empty slug.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.trim().chars() {
        for lower in c.to_lowercase() {
            let folded = fold_char(lower);
            if folded.is_ascii_alphanumeric() {
                if pending_sep && !out.is_empty() {
                    out.push('-');
                }
                pending_sep = false;
                out.push(folded);
            } else {
                pending_sep = true;
            }
        }
    }

    out
}
