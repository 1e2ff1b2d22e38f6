//! URL slugs for posts and categories.

use unicode_normalization::UnicodeNormalization;

/// Lower-cases, decomposes (NFD) and drops combining diacritics, collapses
/// every run of characters outside `[a-z0-9]` into a single `-`, and trims
/// dashes from both ends.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    let lowered = input.to_lowercase();
    for c in lowered.nfd().filter(|c| !is_diacritic(*c)) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Slug for a post: the slugified title plus a millisecond timestamp so two
/// posts with the same title never collide.
pub fn post_slug(title: &str, millis: i64) -> String {
    let base = slugify(title);
    if base.is_empty() {
        format!("post-{}", millis)
    } else {
        format!("{}-{}", base, millis)
    }
}

/// Combining Diacritical Marks block.
fn is_diacritic(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_accents_and_punctuation() {
        assert_eq!(slugify("¿Cómo configuro el módem?"), "como-configuro-el-modem");
        assert_eq!(slugify("Año Nuevo 2025!!"), "ano-nuevo-2025");
    }

    #[test]
    fn slugify_folds_central_european_letters() {
        assert_eq!(slugify("Română și Ştefan"), "romana-si-stefan");
        assert_eq!(slugify("Čeština a Ελληνικά"), "cestina-a");
        assert_eq!(slugify("Győr Ő"), "gyor-o");
    }

    #[test]
    fn slugify_trims_and_collapses_dashes() {
        assert_eq!(slugify("  --Hello   World--  "), "hello-world");
        assert_eq!(slugify("a___b"), "a-b");
    }

    #[test]
    fn slugify_drops_non_latin_text() {
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn post_slug_appends_timestamp() {
        assert_eq!(post_slug("First post", 1700000000123), "first-post-1700000000123");
        assert_eq!(post_slug("???", 5), "post-5");
    }
}
