//! Personalities: stateless decorations wrapped around a composed prompt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AriaError;

/// The fixed set of personalities a user can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Personality {
    #[default]
    Neutral,
    Charlie,
    Tolkien,
    Stewie,
}

impl Personality {
    pub const ALL: [Personality; 4] = [
        Personality::Neutral,
        Personality::Charlie,
        Personality::Tolkien,
        Personality::Stewie,
    ];

    /// Resolve a stored tag. Unknown or absent tags map to [`Personality::Neutral`].
    pub fn resolve(tag: Option<&str>) -> Self {
        tag.and_then(|t| t.parse().ok()).unwrap_or_default()
    }

    /// The tag stored on a user profile.
    pub fn tag(&self) -> &'static str {
        match self {
            Personality::Neutral => "Neutral",
            Personality::Charlie => "Charlie",
            Personality::Tolkien => "Tolkien",
            Personality::Stewie => "Stewie",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Personality::Neutral => "Neutral",
            Personality::Charlie => "Charlie Chaplin",
            Personality::Tolkien => "J. R. R. Tolkien",
            Personality::Stewie => "Stewie Griffin",
        }
    }

    pub fn style_instructions(&self) -> &'static str {
        match self {
            Personality::Neutral => {
                "Communicate in a clear, concise, and objective manner, avoiding emotional language or specific stylistic quirks."
            }
            Personality::Charlie => {
                "Communicate with slapstick humor, silent-film charm, and whimsical physical comedy references."
            }
            Personality::Tolkien => {
                "Use epic narrative tone, mythic metaphors, and high-fantasy worldbuilding."
            }
            Personality::Stewie => {
                "Speak with the theatrical diction of a scheming infant genius, dry British wit, and grand plans for world domination."
            }
        }
    }

    /// Wrap `message` in this personality's style block.
    pub fn apply(&self, message: &str) -> String {
        format!(
            "【{} Style】 {}\nInstructions: {}",
            self.display_name(),
            message,
            self.style_instructions()
        )
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Strict parsing, used when a profile is submitted.
impl FromStr for Personality {
    type Err = AriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Personality::ALL
            .into_iter()
            .find(|p| p.tag() == s)
            .ok_or_else(|| {
                AriaError::validation(
                    "personality",
                    format!(
                        "unknown personality '{s}', expected one of: {}",
                        Personality::ALL.map(|p| p.tag()).join(", ")
                    ),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_format() {
        let out = Personality::Tolkien.apply("hello");
        assert_eq!(
            out,
            "【J. R. R. Tolkien Style】 hello\nInstructions: Use epic narrative tone, mythic metaphors, and high-fantasy worldbuilding."
        );
    }

    #[test]
    fn test_apply_is_deterministic() {
        for p in Personality::ALL {
            assert_eq!(p.apply("same input"), p.apply("same input"));
        }
    }

    #[test]
    fn test_resolve_is_exact_match() {
        assert_eq!(Personality::resolve(Some("Charlie")), Personality::Charlie);
        assert_eq!(Personality::resolve(Some("charlie")), Personality::Neutral);
        assert_eq!(Personality::resolve(Some("")), Personality::Neutral);
        assert_eq!(Personality::resolve(None), Personality::Neutral);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "Gandalf".parse::<Personality>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(err.to_string().contains("Gandalf"));
    }
}
