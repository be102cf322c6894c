use anyhow::{bail, Context, Result};
use chatline_client::{ChatClient, ClientEvent, Draft};
use chatline_proto::ChatMessage;
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    server_url: String,
    #[arg(long)]
    username: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let client = ChatClient::connect(&args.server_url).await?;
    // Subscribe before logging in so the verdict cannot slip past.
    let mut events = client.subscribe_events();
    client.login(&args.username).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !render(&client, event).await? {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line == "/quit" {
                        client.disconnect();
                    } else {
                        submit(&client, line).await;
                    }
                }
                None => {
                    stdin_open = false;
                    client.disconnect();
                }
            },
        }
    }
    Ok(())
}

/// Prints one event. Returns `false` once the connection is gone.
async fn render(client: &ChatClient, event: ClientEvent) -> Result<bool> {
    match event {
        ClientEvent::LoggedIn { username } => println!("logged in as {username}"),
        ClientEvent::LoginRejected(status) => bail!("login rejected: {status:?}"),
        ClientEvent::TimelineUpdated => {
            if let Some(message) = client.messages().await.last() {
                println!("{}", format_message(message));
            }
        }
        ClientEvent::RosterUpdated => {
            let names: Vec<String> = client
                .roster()
                .await
                .iter()
                .map(|entry| {
                    if entry.online {
                        entry.username.clone()
                    } else {
                        format!("{} (offline)", entry.username)
                    }
                })
                .collect();
            if names.is_empty() {
                println!("users: just you");
            } else {
                println!("users: {}", names.join(", "));
            }
        }
        ClientEvent::SendScheduled => println!("(scheduled)"),
        ClientEvent::SendFailed(reason) => println!("send failed: {reason}"),
        ClientEvent::Disconnected => {
            println!("connection closed");
            return Ok(false);
        }
    }
    Ok(true)
}

async fn submit(client: &ChatClient, line: &str) {
    if line.is_empty() {
        return;
    }
    match parse_draft(line) {
        Ok(draft) => {
            if let Err(error) = client.send(draft).await {
                println!("cannot send: {error}");
            }
        }
        Err(error) => println!("{error}"),
    }
}

/// `/to a,b text` addresses users and `/at <rfc3339> text` schedules
/// delivery; the two prefixes combine in either order. Anything else is
/// sent to everyone as written.
fn parse_draft(line: &str) -> Result<Draft> {
    let mut receivers = None;
    let mut schedule_at = None;
    let mut rest = line;
    loop {
        if let Some(tail) = rest.strip_prefix("/to ") {
            let (names, tail) = tail
                .split_once(' ')
                .context("usage: /to name1,name2 message")?;
            receivers = Some(
                names
                    .split(',')
                    .map(|name| name.trim().to_owned())
                    .filter(|name| !name.is_empty())
                    .collect(),
            );
            rest = tail.trim_start();
        } else if let Some(tail) = rest.strip_prefix("/at ") {
            let (stamp, tail) = tail
                .split_once(' ')
                .context("usage: /at 2026-03-01T10:30:00Z message")?;
            let instant = DateTime::parse_from_rfc3339(stamp)
                .with_context(|| format!("bad timestamp {stamp}, want RFC 3339"))?;
            schedule_at = Some(instant.with_timezone(&Utc));
            rest = tail.trim_start();
        } else if rest.starts_with('/') {
            bail!("unknown command, try /to, /at or /quit");
        } else {
            break;
        }
    }
    if rest.is_empty() {
        bail!("empty message");
    }
    Ok(Draft {
        body: rest.to_owned(),
        receivers,
        schedule_at,
    })
}

fn format_message(message: &ChatMessage) -> String {
    let stamp = message.timestamp.format("%H:%M:%S");
    if message.receivers.is_empty() {
        format!("[{stamp}] {}: {}", message.sender, message.body)
    } else {
        format!(
            "[{stamp}] {} (to {}): {}",
            message.sender,
            message.receivers.join(", "),
            message.body
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_broadcast() {
        let draft = parse_draft("good morning").expect("parses");
        assert_eq!(draft.body, "good morning");
        assert_eq!(draft.receivers, None);
        assert_eq!(draft.schedule_at, None);
    }

    #[test]
    fn to_and_at_prefixes_combine() {
        let draft = parse_draft("/to ada,bob /at 2026-03-01T10:30:00Z lunch?").expect("parses");
        assert_eq!(
            draft.receivers.as_deref(),
            Some(&["ada".to_owned(), "bob".to_owned()][..])
        );
        let due = draft.schedule_at.expect("scheduled");
        assert_eq!(due.to_rfc3339(), "2026-03-01T10:30:00+00:00");
        assert_eq!(draft.body, "lunch?");
    }

    #[test]
    fn bad_directives_are_reported() {
        assert!(parse_draft("/at soonish hello").is_err());
        assert!(parse_draft("/to ada").is_err());
        assert!(parse_draft("/frobnicate hello").is_err());
        assert!(parse_draft("/to ada ").is_err());
    }
}
