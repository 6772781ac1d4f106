use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal failures of a remapping run.
///
/// A class that cannot be found is not an error: providers return `Ok(None)`
/// and the resolver caches the miss.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("malformed mapping: {message}")]
    MalformedMapping { message: String },

    #[error("malformed class file: {message}")]
    ClassFormat { message: String },

    #[error("unsupported input: {message}")]
    Unsupported { message: String },

    #[error("in entry {entry}")]
    Entry {
        entry: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn malformed_mapping(message: impl Into<String>) -> Self {
        Self::MalformedMapping {
            message: message.into(),
        }
    }

    pub fn class_format(message: impl Into<String>) -> Self {
        Self::ClassFormat {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Attaches the archive entry being processed.
    pub fn in_entry(self, entry: impl Into<String>) -> Self {
        Self::Entry {
            entry: entry.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_the_entry_and_chains_the_cause_once() {
        let err = Error::class_format("bad magic").in_entry("a/B.class");
        assert_eq!(err.to_string(), "in entry a/B.class");

        let chain: Vec<String> = anyhow::Error::from(err).chain().map(|e| e.to_string()).collect();
        assert_eq!(
            chain,
            vec![
                "in entry a/B.class".to_string(),
                "malformed class file: bad magic".to_string(),
            ]
        );
    }
}
