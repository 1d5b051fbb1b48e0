//! Interactive login, run once before any listing.
//!
//! Session state itself lives on the gateway; this module only drives the
//! code / password challenge when the gateway reports we are signed out.

use crate::api::{Account, ApiError, HttpDirectory};
use async_trait::async_trait;
use std::io::{BufRead, Write};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Login request failed: {0}")]
    Api(#[from] ApiError),

    #[error("Could not read {what} from prompt: {source}")]
    Prompt {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Login operations the setup phase needs from the gateway.
#[async_trait]
pub trait SessionGate: Send + Sync {
    async fn is_authorized(&self) -> Result<bool, ApiError>;
    async fn send_code(&self, phone: &str) -> Result<(), ApiError>;
    /// Fails with [`ApiError::PasswordNeeded`] when two-step verification is on
    async fn sign_in_code(&self, phone: &str, code: &str) -> Result<(), ApiError>;
    async fn sign_in_password(&self, password: &str) -> Result<(), ApiError>;
    async fn me(&self) -> Result<Account, ApiError>;
}

#[async_trait]
impl SessionGate for HttpDirectory {
    async fn is_authorized(&self) -> Result<bool, ApiError> {
        Ok(self.session_status().await?.authorized)
    }

    async fn send_code(&self, phone: &str) -> Result<(), ApiError> {
        HttpDirectory::send_code(self, phone).await
    }

    async fn sign_in_code(&self, phone: &str, code: &str) -> Result<(), ApiError> {
        HttpDirectory::sign_in_code(self, phone, code).await
    }

    async fn sign_in_password(&self, password: &str) -> Result<(), ApiError> {
        HttpDirectory::sign_in_password(self, password).await
    }

    async fn me(&self) -> Result<Account, ApiError> {
        HttpDirectory::me(self).await
    }
}

/// Source of answers to interactive questions.
pub trait Prompter {
    fn ask(&mut self, question: &str) -> std::io::Result<String>;
}

/// Reads answers from a line-oriented reader, echoing questions to a writer.
pub struct LinePrompter<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl LinePrompter<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn ask(&mut self, question: &str) -> std::io::Result<String> {
        write!(self.writer, "{}", question)?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "input closed",
            ));
        }
        Ok(line.trim().to_string())
    }
}

fn ask(prompter: &mut dyn Prompter, question: &str, what: &'static str) -> Result<String, SessionError> {
    prompter
        .ask(question)
        .map_err(|source| SessionError::Prompt { what, source })
}

/// Make sure the gateway session is signed in, prompting for the login code
/// (and the account password, if required) when it is not.
pub async fn ensure_authorized<G: SessionGate + ?Sized>(
    gate: &G,
    prompter: &mut dyn Prompter,
    phone: &str,
) -> Result<Account, SessionError> {
    if !gate.is_authorized().await? {
        gate.send_code(phone).await?;
        let code = ask(prompter, "Enter the code: ", "login code")?;

        match gate.sign_in_code(phone, &code).await {
            Ok(()) => {}
            Err(ApiError::PasswordNeeded) => {
                let password = ask(prompter, "Password: ", "password")?;
                gate.sign_in_password(&password).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let me = gate.me().await?;
    info!(
        "Successfully signed in as {}",
        me.username.as_deref().unwrap_or("<no username>")
    );
    Ok(me)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedGate {
        authorized: bool,
        needs_password: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGate {
        fn new(authorized: bool, needs_password: bool) -> Self {
            Self {
                authorized,
                needs_password,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionGate for ScriptedGate {
        async fn is_authorized(&self) -> Result<bool, ApiError> {
            Ok(self.authorized)
        }

        async fn send_code(&self, phone: &str) -> Result<(), ApiError> {
            self.log(format!("code:{phone}"));
            Ok(())
        }

        async fn sign_in_code(&self, _phone: &str, code: &str) -> Result<(), ApiError> {
            self.log(format!("sign_in:{code}"));
            if self.needs_password {
                Err(ApiError::PasswordNeeded)
            } else {
                Ok(())
            }
        }

        async fn sign_in_password(&self, password: &str) -> Result<(), ApiError> {
            self.log(format!("password:{password}"));
            Ok(())
        }

        async fn me(&self) -> Result<Account, ApiError> {
            Ok(Account {
                id: 1,
                username: Some("exporter".into()),
            })
        }
    }

    struct Answers(VecDeque<&'static str>);

    impl Prompter for Answers {
        fn ask(&mut self, _question: &str) -> std::io::Result<String> {
            self.0
                .pop_front()
                .map(str::to_string)
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
        }
    }

    #[tokio::test]
    async fn test_already_authorized_skips_challenge() {
        let gate = ScriptedGate::new(true, false);
        let mut answers = Answers(VecDeque::new());
        let me = ensure_authorized(&gate, &mut answers, "+1").await.unwrap();
        assert_eq!(me.username.as_deref(), Some("exporter"));
        assert!(gate.calls().is_empty());
    }

    #[tokio::test]
    async fn test_code_challenge() {
        let gate = ScriptedGate::new(false, false);
        let mut answers = Answers(VecDeque::from(["12345"]));
        ensure_authorized(&gate, &mut answers, "+1").await.unwrap();
        assert_eq!(gate.calls(), vec!["code:+1", "sign_in:12345"]);
    }

    #[tokio::test]
    async fn test_password_fallback() {
        let gate = ScriptedGate::new(false, true);
        let mut answers = Answers(VecDeque::from(["12345", "hunter2"]));
        ensure_authorized(&gate, &mut answers, "+1").await.unwrap();
        assert_eq!(
            gate.calls(),
            vec!["code:+1", "sign_in:12345", "password:hunter2"]
        );
    }

    #[tokio::test]
    async fn test_closed_prompt_is_reported() {
        let gate = ScriptedGate::new(false, false);
        let mut answers = Answers(VecDeque::new());
        let err = ensure_authorized(&gate, &mut answers, "+1").await.unwrap_err();
        assert!(matches!(err, SessionError::Prompt { what: "login code", .. }));
    }

    #[test]
    fn test_line_prompter_trims_and_echoes() {
        let input = std::io::Cursor::new(b"  4242 \n".to_vec());
        let mut output = Vec::new();
        let answer = LinePrompter::new(input, &mut output)
            .ask("Enter the code: ")
            .unwrap();
        assert_eq!(answer, "4242");
        assert_eq!(String::from_utf8(output).unwrap(), "Enter the code: ");
    }
}
