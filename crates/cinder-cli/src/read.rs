//! Viewer loop for `cinder read`.
//!
//! The note is fetched once. After that nothing typed by the user may end the
//! loop early: a malformed or wrong passphrase only leads to another prompt,
//! because the body held by the session is the last copy in existence.

use std::{io::Write, time::Duration};

use cinder_client::{
    DecryptFailure, NoteGateway, Passphrase, RetrievalState, session::RetrievalSession,
};
use tokio::io::{AsyncBufRead, Lines};

use crate::error::CliError;

/// Pause between automatic fetch retries.
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Decrypt calls allowed to fail in transport before giving up.
const MAX_DECRYPT_TRANSPORT_FAILURES: u32 = 3;

/// Fetch the note and decrypt it, prompting on `input` when `secret` is
/// absent. Returns the plaintext.
///
/// With a `secret`, a rejected passphrase ends the loop with
/// [`CliError::WrongPassphrase`]; without one, the user is asked again until
/// input runs out.
pub async fn run_read<G, R, W>(
    session: &mut RetrievalSession<G>,
    secret: Option<Passphrase>,
    input: &mut Lines<R>,
    out: &mut W,
) -> Result<String, CliError>
where
    G: NoteGateway,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    session.open().await;
    while let RetrievalState::FetchFailed { reason, attempts } = session.state() {
        tracing::warn!(attempts, %reason, "fetch failed, retrying");
        tokio::time::sleep(FETCH_RETRY_DELAY).await;
        session.retry_fetch().await;
    }

    let interactive = secret.is_none();
    let mut last = secret;
    let mut transport_failures = 0;

    loop {
        let retry_last = match session.state() {
            RetrievalState::AwaitingSecret => !interactive,
            RetrievalState::DecryptFailed { failure: DecryptFailure::Rejected } => {
                if !interactive {
                    return Err(CliError::WrongPassphrase);
                }
                writeln!(out, "wrong passphrase, try again")?;
                false
            },
            RetrievalState::DecryptFailed { failure: DecryptFailure::Transport(reason) } => {
                transport_failures += 1;
                if transport_failures >= MAX_DECRYPT_TRANSPORT_FAILURES {
                    return Err(CliError::Unreachable(reason.clone()));
                }
                tracing::warn!(%reason, "decrypt request failed, retrying");
                true
            },
            RetrievalState::Decrypted { plaintext } => return Ok(plaintext.clone()),
            RetrievalState::Gone => return Err(CliError::Gone),
            RetrievalState::Unreachable { reason } => {
                return Err(CliError::Unreachable(reason.clone()));
            },
            RetrievalState::Abandoned
            | RetrievalState::Fetching { .. }
            | RetrievalState::FetchFailed { .. }
            | RetrievalState::Decrypting { .. } => return Err(CliError::Cancelled),
        };

        let passphrase = match last.take() {
            Some(passphrase) if retry_last => passphrase,
            _ => prompt(input, out).await?,
        };
        last = Some(passphrase.clone());
        session.submit_secret(passphrase).await;
    }
}

/// Ask until a line parses as a passphrase.
async fn prompt<R, W>(input: &mut Lines<R>, out: &mut W) -> Result<Passphrase, CliError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        writeln!(out, "passphrase:")?;
        out.flush()?;
        let Some(line) = input.next_line().await? else {
            return Err(CliError::NoSecret);
        };
        match Passphrase::parse(&line) {
            Ok(passphrase) => return Ok(passphrase),
            Err(e) => writeln!(out, "{e}, try again")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use cinder_client::{
        CreateNoteRequest, DecryptOutcome, FetchOutcome, GatewayError, NoteId,
    };
    use tokio::io::{AsyncBufReadExt, BufReader};

    use super::*;

    const BODY: &[u8] = b"sealed";

    fn right_key() -> Passphrase {
        Passphrase::from_bytes([7; 32])
    }

    /// Hands out the body once; only `right_key` opens it.
    #[derive(Default)]
    struct OneNoteGateway {
        fetches: AtomicU32,
        decrypts: AtomicU32,
    }

    impl NoteGateway for OneNoteGateway {
        async fn create_note(&self, _request: &CreateNoteRequest) -> Result<NoteId, GatewayError> {
            Err(GatewayError::Rejected("read only".to_string()))
        }

        async fn fetch_note(&self, _id: NoteId) -> Result<FetchOutcome, GatewayError> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(FetchOutcome::Found(BODY.to_vec()))
            } else {
                Ok(FetchOutcome::NotFound)
            }
        }

        async fn decrypt(
            &self,
            body: &[u8],
            passphrase: &Passphrase,
        ) -> Result<DecryptOutcome, GatewayError> {
            self.decrypts.fetch_add(1, Ordering::SeqCst);
            if body == BODY && *passphrase == right_key() {
                Ok(DecryptOutcome::Plaintext("hello".to_string()))
            } else {
                Ok(DecryptOutcome::Rejected)
            }
        }

        async fn issue_key(&self) -> Result<Passphrase, GatewayError> {
            Ok(right_key())
        }
    }

    async fn read_with_input(
        gateway: &OneNoteGateway,
        secret: Option<Passphrase>,
        typed: &str,
    ) -> (Result<String, CliError>, String) {
        let (mut session, _handle) =
            RetrievalSession::new(gateway, NoteId::from_bytes([1; 16]), 3);
        let mut input = BufReader::new(typed.as_bytes()).lines();
        let mut out = Vec::new();

        let result = run_read(&mut session, secret, &mut input, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn malformed_passphrase_prompts_again() {
        let gateway = OneNoteGateway::default();
        let typed = format!("typo-not-a-key\n{}\n", right_key().encode());

        let (result, out) = read_with_input(&gateway, None, &typed).await;

        assert_eq!(result.unwrap(), "hello");
        assert!(out.contains("invalid passphrase"));
        assert_eq!(out.lines().filter(|line| *line == "passphrase:").count(), 2);
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.decrypts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_passphrase_prompts_again_without_refetching() {
        let gateway = OneNoteGateway::default();
        let wrong = Passphrase::from_bytes([8; 32]).encode();
        let typed = format!("{wrong}\n{}\n", right_key().encode());

        let (result, out) = read_with_input(&gateway, None, &typed).await;

        assert_eq!(result.unwrap(), "hello");
        assert!(out.contains("wrong passphrase"));
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.decrypts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn input_running_out_is_no_secret() {
        let gateway = OneNoteGateway::default();

        let (result, _) = read_with_input(&gateway, None, "garbage\n").await;

        assert!(matches!(result, Err(CliError::NoSecret)));
        assert_eq!(gateway.decrypts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn given_secret_skips_the_prompt() {
        let gateway = OneNoteGateway::default();

        let (result, out) = read_with_input(&gateway, Some(right_key()), "").await;

        assert_eq!(result.unwrap(), "hello");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn given_wrong_secret_fails_without_prompting() {
        let gateway = OneNoteGateway::default();

        let (result, out) =
            read_with_input(&gateway, Some(Passphrase::from_bytes([8; 32])), "").await;

        assert!(matches!(result, Err(CliError::WrongPassphrase)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn consumed_note_is_gone() {
        let gateway = OneNoteGateway::default();
        gateway.fetches.store(1, Ordering::SeqCst);

        let (result, _) = read_with_input(&gateway, Some(right_key()), "").await;

        assert!(matches!(result, Err(CliError::Gone)));
    }
}
