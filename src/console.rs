//! Operator commands read from standard input when
//! `enable_console_commands` is set.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use zeroize::Zeroizing;

use crate::{
    error::{AppError, Result},
    models::user::{AccountType, RegistrationState},
    repositories::user::NewUser,
    state::AppState,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Exit,
    CreateAdmin {
        forename: String,
        surname: String,
        email: String,
        password: Zeroizing<String>,
    },
    ConfirmEmail(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["exit"] => Ok(Command::Exit),
            ["create-admin", forename, surname, email, password] => Ok(Command::CreateAdmin {
                forename: forename.to_string(),
                surname: surname.to_string(),
                email: email.to_string(),
                password: Zeroizing::new(password.to_string()),
            }),
            ["confirm-email", username] => Ok(Command::ConfirmEmail(username.to_string())),
            _ => Err(AppError::InvalidRequest(format!(
                "Unknown command: {}",
                parts.first().unwrap_or(&"")
            ))),
        }
    }
}

/// Runs one command. Returns true when the process should shut down.
pub async fn execute(state: &AppState, command: Command) -> Result<bool> {
    match command {
        Command::Exit => Ok(true),
        Command::CreateAdmin {
            forename,
            surname,
            email,
            password,
        } => {
            let user = state
                .users
                .add_user(NewUser {
                    forename,
                    surname,
                    email,
                    password,
                    account_type: AccountType::SuperAdmin,
                    state: RegistrationState::Complete,
                })
                .await?;
            state.persist_users().await;
            tracing::info!("👑 Created super admin {}", user.username);
            Ok(false)
        }
        Command::ConfirmEmail(username) => {
            state
                .users
                .transition(&username, RegistrationState::confirm_email)?;
            state.persist_users().await;
            Ok(false)
        }
    }
}

/// Reads commands until `exit` or end of input, then signals shutdown.
pub async fn run(state: AppState, shutdown: watch::Sender<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("⌨️ Console commands enabled: exit, create-admin, confirm-email");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("Console input closed");
                return;
            }
            Err(e) => {
                tracing::error!("Console read failed: {}", e);
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let outcome = match Command::parse(&line) {
            Ok(command) => execute(&state, command).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(true) => {
                tracing::info!("Console requested shutdown");
                let _ = shutdown.send(true);
                return;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Console command failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse(" exit ").unwrap(), Command::Exit);
        assert_eq!(
            Command::parse("confirm-email JemGunay").unwrap(),
            Command::ConfirmEmail("JemGunay".to_string())
        );
        match Command::parse("create-admin Jem Gunay j@x.co Abcd1!ef").unwrap() {
            Command::CreateAdmin { forename, email, password, .. } => {
                assert_eq!(forename, "Jem");
                assert_eq!(email, "j@x.co");
                assert_eq!(password.as_str(), "Abcd1!ef");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_or_short_commands() {
        assert!(Command::parse("create-admin Jem").is_err());
        assert!(Command::parse("reboot").is_err());
    }
}
