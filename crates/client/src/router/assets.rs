//! Static asset classification by file extension.

use std::sync::LazyLock;

use regex::Regex;

static STATIC_ASSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(png|jpe?g|gif|svg|webp|avif|ico|bmp|js|mjs|css|woff2?|ttf|otf|eot)$")
        .expect("static asset pattern is valid")
});

static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpe?g|gif|svg|webp|avif|ico|bmp)$").expect("image pattern is valid"));

/// Images, scripts, styles and fonts.
pub fn is_static_asset(path: &str) -> bool {
    STATIC_ASSET.is_match(path)
}

pub fn is_image(path: &str) -> bool {
    IMAGE.is_match(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_assets() {
        for path in ["/app.js", "/chunks/main.mjs", "/style.css", "/logo.PNG", "/a.jpeg", "/f.woff2", "/f.woff"] {
            assert!(is_static_asset(path), "{path}");
        }
        for path in ["/", "/index.html", "/api/users", "/file.pdf", "/js/", "/app.js.map"] {
            assert!(!is_static_asset(path), "{path}");
        }
    }

    #[test]
    fn test_images() {
        assert!(is_image("/img/hero.webp"));
        assert!(is_image("/favicon.ico"));
        assert!(!is_image("/app.js"));
        assert!(!is_image("/fonts/inter.woff2"));
    }
}
