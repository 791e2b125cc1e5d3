use serde::{Deserialize, Serialize};

use super::connection::UserId;

/// Canonical account profile from the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Profile {
    /// `"first last"` with surrounding whitespace removed; empty when neither part is set.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_owned()
    }

    pub fn photo_reference(&self) -> Option<&str> {
        self.photo_url.as_deref().filter(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_name() {
        let mut profile = Profile {
            id: "u-1".into(),
            first_name: Some(String::from("Grace")),
            last_name: None,
            photo_url: Some(String::from("  ")),
        };
        assert_eq!(profile.display_name(), "Grace");
        assert_eq!(profile.photo_reference(), None);

        profile.first_name = None;
        assert_eq!(profile.display_name(), "");
    }
}
