//! Manual disambiguation of geocoding candidates

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stderr};
use tokio::sync::Mutex;

use crate::geocode::error::PromptError;
use crate::geocode::models::{AddressQuery, GeocodeCandidate};

/// What a person picked when asked to disambiguate
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Index into the presented candidates
    Index(usize),
    /// Geocode this address instead
    Replace(AddressQuery),
}

#[async_trait]
pub trait SelectionPrompt: Send + Sync {
    /// Present `candidates` for `address` and wait for a choice.
    ///
    /// `PromptError::Invalid` means the input was unusable and the caller
    /// should ask again.
    async fn choose(
        &self,
        address: &str,
        comment: Option<&str>,
        candidates: &[GeocodeCandidate],
    ) -> Result<Selection, PromptError>;
}

/// One line describing a candidate, with a map link for checking it by eye
pub fn describe_candidate(index: usize, candidate: &GeocodeCandidate) -> String {
    let url = format!(
        "https://www.latlong.net/c/?lat={}&long={}",
        candidate.latitude(),
        candidate.longitude()
    );
    let match_str = match &candidate.properties.match_code {
        Some(code) => format!(
            "\tConfidence: {}. Matches: {}",
            code.confidence
                .map(|c| c.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            code.matched_fields().join(",")
        ),
        None => String::new(),
    };
    format!("{}:\t{}{}:\t{}", index, candidate.full_address(), match_str, url)
}

/// Text prompt over a reader/writer pair (stdin/stderr by default)
pub struct ConsolePrompt<R, W> {
    io: Mutex<(R, W)>,
}

impl ConsolePrompt<BufReader<Stdin>, Stderr> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl<R, W> ConsolePrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    /// Give back the underlying reader and writer
    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

async fn read_answer<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, PromptError> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(PromptError::Closed);
    }
    Ok(line.trim().to_string())
}

#[async_trait]
impl<R, W> SelectionPrompt for ConsolePrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn choose(
        &self,
        address: &str,
        comment: Option<&str>,
        candidates: &[GeocodeCandidate],
    ) -> Result<Selection, PromptError> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        let mut text = format!(
            "Unable to determine single match for location at address: {}.\n",
            address
        );
        if let Some(comment) = comment.filter(|c| !c.is_empty()) {
            text.push_str(comment);
            text.push('\n');
        }
        for (i, candidate) in candidates.iter().enumerate() {
            text.push_str(&describe_candidate(i, candidate));
            text.push('\n');
        }
        text.push_str(" Please pick an option as numbered (or -1 to manually enter a new address): ");
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;

        let answer = read_answer(reader).await?;
        let chosen: i64 = answer
            .parse()
            .map_err(|_| PromptError::Invalid(format!("'{}' is not a number", answer)))?;
        if chosen >= 0 {
            return Ok(Selection::Index(chosen as usize));
        }

        writer.write_all(b"Please enter a new address: ").await?;
        writer.flush().await?;
        let answer = read_answer(reader).await?;
        AddressQuery::parse_line(&answer)
            .map(Selection::Replace)
            .ok_or_else(|| PromptError::Invalid("empty address".to_string()))
    }
}
