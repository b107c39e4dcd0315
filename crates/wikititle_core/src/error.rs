use thiserror::Error;

/// Reasons a string cannot become a [`Title`](crate::title::Title).
///
/// Each variant keeps the text being examined when the check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TitleError {
    #[error("bad UTF-8 in title \"{title}\"")]
    InvalidEncoding { title: String },

    #[error("empty title")]
    EmptyTitle { title: String },

    #[error("invalid Talk namespace title \"{title}\"")]
    InvalidTalkNamespace { title: String },

    #[error("invalid characters in title \"{title}\"")]
    InvalidCharacters { title: String },

    #[error("title \"{title}\" contains relative path components")]
    InvalidRelativePath { title: String },

    #[error("title \"{title}\" contains ~~~")]
    InvalidMagicTilde { title: String },

    #[error("title \"{title}\" is too long")]
    TitleTooLong { title: String },
}

impl TitleError {
    /// Stable message key, matching the wiki's `title-invalid-*` messages.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEncoding { .. } => "title-invalid-utf8",
            Self::EmptyTitle { .. } => "title-invalid-empty",
            Self::InvalidTalkNamespace { .. } => "title-invalid-talk-namespace",
            Self::InvalidCharacters { .. } => "title-invalid-characters",
            Self::InvalidRelativePath { .. } => "title-invalid-relative",
            Self::InvalidMagicTilde { .. } => "title-invalid-magic-tilde",
            Self::TitleTooLong { .. } => "title-invalid-too-long",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::InvalidEncoding { title }
            | Self::EmptyTitle { title }
            | Self::InvalidTalkNamespace { title }
            | Self::InvalidCharacters { title }
            | Self::InvalidRelativePath { title }
            | Self::InvalidMagicTilde { title }
            | Self::TitleTooLong { title } => title,
        }
    }
}
