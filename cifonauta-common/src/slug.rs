//! Slug generation for named catalog entries
//!
//! Every author, tag, taxon, place, reference and tour gets its slug from
//! its name right before it is written.

use unicode_normalization::UnicodeNormalization;

/// Lower-case ASCII slug: accents folded, whitespace and dashes collapsed
/// to a single `-`, anything else dropped.
///
/// Names are decomposed (NFKD) first so combining marks fall away from
/// their base letter; letters with no decomposition are folded by hand.
///
/// ```
/// use cifonauta_common::slug::slugify;
///
/// assert_eq!(slugify("São Sebastião"), "sao-sebastiao");
/// assert_eq!(slugify("Homo sapiens"), "homo-sapiens");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.nfkd() {
        match fold_letter(ch) {
            Some(folded) => {
                for c in folded.chars() {
                    push_slug_char(&mut slug, &mut pending_dash, c);
                }
            }
            None => push_slug_char(&mut slug, &mut pending_dash, ch),
        }
    }

    slug
}

fn push_slug_char(slug: &mut String, pending_dash: &mut bool, c: char) {
    if c.is_ascii_alphanumeric() || c == '_' {
        if *pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        *pending_dash = false;
        slug.push(c.to_ascii_lowercase());
    } else if c.is_whitespace() || c == '-' {
        *pending_dash = true;
    }
}

/// Latin letters that NFKD leaves whole
fn fold_letter(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'æ' | 'Æ' => "ae",
        'œ' | 'Œ' => "oe",
        'ø' | 'Ø' => "o",
        'ł' | 'Ł' => "l",
        'đ' | 'Đ' | 'ð' | 'Ð' => "d",
        'þ' | 'Þ' => "th",
        'ß' => "ss",
        'ı' => "i",
        _ => return None,
    };
    Some(folded)
}
