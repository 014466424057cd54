//! # Storage URL Resolution
//!
//! Media and image fields persist relative paths only. Turning a path into
//! a fetchable URL is the file-storage collaborator's job.

/// Resolves a stored relative path to a URL.
pub trait StorageUrlResolver: Send + Sync {
    fn url_for(&self, path: &str) -> String;
}

/// Joins a public base URL and the stored path.
#[derive(Debug, Clone)]
pub struct PublicUrlResolver {
    base_url: String,
}

impl PublicUrlResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        PublicUrlResolver {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl StorageUrlResolver for PublicUrlResolver {
    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_joins_once() {
        let resolver = PublicUrlResolver::new("https://cdn.example.com/media/");
        assert_eq!(
            resolver.url_for("/products/shoe.jpg"),
            "https://cdn.example.com/media/products/shoe.jpg"
        );
    }
}
