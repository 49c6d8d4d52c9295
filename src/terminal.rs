//! Line-based front end for an editing session.
use anyhow::Context;
use itertools::Itertools;
use reqwest::Url;
use std::{io::Write, str::FromStr, sync::Arc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::info;

use crate::{
    client::RouteApiClient,
    config::Config,
    editor::{
        EditError, Field, Nudge, RouteEditor, UnknownField,
        seed::{parse_route_page, resolve_route_id},
    },
    model::{Stop, StopTime, parse_delay},
};

const HELP: &str = "\
commands (N is a stop's position, starting at 1):
  ls                        show the stops
  add [HH:MM [delay [name]]]  append a stop
  del N                     delete a stop
  + N / - N                 move a stop's delay by one minute
  name N text               rename a stop
  time N HH:MM              change a stop's scheduled time
  delay N minutes           set a stop's delay
  reset                     set every delay to 0
  status                    show whether changes are saved
  quit                      save and leave";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    List,
    Add(Option<Stop>),
    Delete(usize),
    Nudge(usize, Nudge),
    Edit(usize, Field, String),
    Reset,
    Status,
    Help,
    Quit,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command \"{0}\", try help")]
    Unknown(String),

    #[error("{0} needs a stop position")]
    MissingPosition(&'static str),

    #[error("\"{0}\" is not a stop position")]
    BadPosition(String),

    #[error(transparent)]
    UnknownField(#[from] UnknownField),

    #[error("there is no stop {0}")]
    NoSuchStop(usize),

    #[error(transparent)]
    Edit(#[from] EditError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        Ok(match word {
            "ls" | "list" => Command::List,
            "add" => Command::Add(parse_new_stop(rest)?),
            "del" | "delete" => Command::Delete(position(rest, "del")?.0),
            "+" => Command::Nudge(position(rest, "+")?.0, Nudge::Up),
            "-" => Command::Nudge(position(rest, "-")?.0, Nudge::Down),
            "name" | "time" | "delay" => {
                let (n, value) = position(rest, "edit")?;
                Command::Edit(n, word.parse()?, value.to_string())
            }
            "reset" => Command::Reset,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        })
    }
}

/// Splits a one-based stop position off the front of `args`.
fn position<'a>(args: &'a str, command: &'static str) -> Result<(usize, &'a str), CommandError> {
    let (n, tail) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    if n.is_empty() {
        return Err(CommandError::MissingPosition(command));
    }

    match n.parse::<usize>() {
        Ok(n) if n > 0 => Ok((n - 1, tail.trim())),
        _ => Err(CommandError::BadPosition(n.to_string())),
    }
}

/// `add` with no arguments uses the default new stop.
fn parse_new_stop(args: &str) -> Result<Option<Stop>, CommandError> {
    if args.is_empty() {
        return Ok(None);
    }

    let mut parts = args.split_whitespace();
    let mut stop = Stop::default();

    if let Some(time) = parts.next() {
        stop.time = time
            .parse::<StopTime>()
            .map_err(|e| CommandError::Edit(e.into()))?;
    }
    if let Some(delay) = parts.next() {
        stop.delay = parse_delay(delay);
    }
    let name = parts.join(" ");
    if !name.is_empty() {
        stop.name = name;
    }

    Ok(Some(stop))
}

/// Loads the page, then edits until `quit` or end of input.
pub async fn edit(config: &Config, page_url: Url, route_id: Option<String>) -> anyhow::Result<()> {
    let client = Arc::new(
        RouteApiClient::new(page_url.clone(), config.http_timeout)
            .context("Couldn't build the http client")?,
    );

    let html = client.fetch_page(&page_url).await?;
    let mut seeded = parse_route_page(&html).context("Couldn't read the route page")?;
    seeded.route_id = resolve_route_id(route_id.as_deref(), seeded.route_id, &page_url);

    let mut editor = RouteEditor::open(seeded, client, config.autosave);

    let mut stdout = std::io::stdout();
    if editor.route_id().is_none() {
        writeln!(
            stdout,
            "warning: no route identifier, changes will not be saved"
        )?;
    }

    run(&mut editor, BufReader::new(tokio::io::stdin()), &mut stdout).await?;

    let status = editor.close().await;
    info!(%status, "editing finished");
    writeln!(stdout, "{status}")?;

    Ok(())
}

/// Reads commands from `input` and applies them until `quit` or end of input.
pub async fn run<R, W>(editor: &mut RouteEditor, input: R, out: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    if !editor.title().is_empty() {
        writeln!(out, "{}", editor.title())?;
    }
    print_rows(editor, out)?;

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => {
                if let Err(e) = apply(editor, command, &mut lines, out).await? {
                    writeln!(out, "{e}")?;
                }
            }
            Err(e) => writeln!(out, "{e}")?,
        }
    }

    Ok(())
}

/// The outer error is a broken terminal, the inner one a command that couldn't be applied.
async fn apply<R, W>(
    editor: &mut RouteEditor,
    command: Command,
    lines: &mut Lines<R>,
    out: &mut W,
) -> anyhow::Result<Result<(), CommandError>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let row = |editor: &RouteEditor, n: usize| editor.row_at(n).ok_or(CommandError::NoSuchStop(n + 1));

    let applied: Result<(), CommandError> = match command {
        Command::List => {
            print_rows(editor, out)?;
            return Ok(Ok(()));
        }
        Command::Status => {
            writeln!(out, "{}", editor.save_status())?;
            return Ok(Ok(()));
        }
        Command::Help => {
            writeln!(out, "{HELP}")?;
            return Ok(Ok(()));
        }
        Command::Quit => return Ok(Ok(())),
        Command::Add(stop) => {
            editor.add_stop(stop);
            Ok(())
        }
        Command::Delete(n) => row(editor, n)
            .and_then(|id| editor.delete_stop(id).map(|_| ()).map_err(Into::into)),
        Command::Nudge(n, nudge) => row(editor, n)
            .and_then(|id| editor.adjust_delay(id, nudge).map(|_| ()).map_err(Into::into)),
        Command::Edit(n, field, value) => row(editor, n)
            .and_then(|id| editor.edit_field(id, field, &value).map_err(Into::into)),
        Command::Reset => {
            let (prompt_out, answers) = (&mut *out, &mut *lines);
            let confirmed = editor
                .reset_all_delays(|prompt| async move {
                    let asked = write!(prompt_out, "{prompt} [y/N] ").and_then(|_| prompt_out.flush());
                    if asked.is_err() {
                        return false;
                    }

                    matches!(
                        answers.next_line().await,
                        Ok(Some(answer)) if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
                    )
                })
                .await;

            if !confirmed {
                writeln!(out, "reset cancelled")?;
            }
            Ok(())
        }
    };

    if applied.is_ok() {
        print_rows(editor, out)?;
    }

    Ok(applied)
}

fn print_rows<W: Write>(editor: &RouteEditor, out: &mut W) -> std::io::Result<()> {
    if editor.is_empty() {
        writeln!(out, "  (no stops)")?;
    }
    for row in editor.rows() {
        writeln!(out, "{row}")?;
    }
    writeln!(out, "  [{}]", editor.save_status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{
        autosave::{AutosaveSettings, tests::RecordingSink},
        seed::SeededRoute,
    };
    use crate::model::RouteId;

    #[test]
    fn commands_parse() {
        assert_eq!("ls".parse::<Command>(), Ok(Command::List));
        assert_eq!("add".parse::<Command>(), Ok(Command::Add(None)));
        assert_eq!(
            "add 18:05 3 Zaandam Centrum".parse::<Command>(),
            Ok(Command::Add(Some(Stop::new(
                "Zaandam Centrum",
                "18:05".parse().unwrap(),
                3
            ))))
        );
        assert_eq!(
            "add  18:05   3  Zaandam   Centrum ".parse::<Command>(),
            Ok(Command::Add(Some(Stop::new(
                "Zaandam Centrum",
                "18:05".parse().unwrap(),
                3
            ))))
        );
        assert_eq!("del 2".parse::<Command>(), Ok(Command::Delete(1)));
        assert_eq!("+ 1".parse::<Command>(), Ok(Command::Nudge(0, Nudge::Up)));
        assert_eq!("- 3".parse::<Command>(), Ok(Command::Nudge(2, Nudge::Down)));
        assert_eq!(
            "name 1 Hoogzand  Centrum".parse::<Command>(),
            Ok(Command::Edit(0, Field::Name, "Hoogzand  Centrum".to_string()))
        );
        assert_eq!(
            "delay 4 x".parse::<Command>(),
            Ok(Command::Edit(3, Field::Delay, "x".to_string()))
        );
    }

    #[test]
    fn bad_commands_explain_themselves() {
        assert_eq!(
            "fly".parse::<Command>(),
            Err(CommandError::Unknown("fly".to_string()))
        );
        assert_eq!(
            "del".parse::<Command>(),
            Err(CommandError::MissingPosition("del"))
        );
        assert_eq!(
            "+ 0".parse::<Command>(),
            Err(CommandError::BadPosition("0".to_string()))
        );
        assert!(matches!(
            "add 25:00".parse::<Command>(),
            Err(CommandError::Edit(EditError::InvalidTime(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn a_session_applies_commands_in_order() -> Result<(), anyhow::Error> {
        let sink = Arc::new(RecordingSink::default());
        let seeded = SeededRoute {
            route_id: RouteId::new("line-33"),
            title: "Line 33".to_string(),
            stops: vec![Stop::new("Oosterblok", "17:53".parse()?, 9)],
        };
        let mut editor = RouteEditor::open(seeded, sink.clone(), AutosaveSettings::default());

        let input = "+ 1\nadd 18:00 2 Baaier\ndel 9\nreset\nn\nreset\ny\nquit\nadd\n";
        let mut out = Vec::new();
        run(&mut editor, BufReader::new(input.as_bytes()), &mut out).await?;

        let out = String::from_utf8(out)?;
        assert!(out.contains("there is no stop 9"));
        assert!(out.contains("Reset all delays to 0? [y/N]"));
        assert!(out.contains("reset cancelled"));
        assert_eq!(
            editor.stops(),
            vec![
                Stop::new("Oosterblok", "17:53".parse()?, 0),
                Stop::new("Baaier", "18:00".parse()?, 0),
            ]
        );

        editor.close().await;
        assert_eq!(sink.saves().len(), 1);

        Ok(())
    }
}
