//! Console command parsing
//!
//! The host feeds raw command lines here; malformed input yields a usage
//! string instead of an error so the session never crashes on typos.

use moonglow_events::KeyCombo;

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// `playscript <name>`
    Play(String),
    /// `stopscript <name>`
    Stop(String),
    /// `togglescript <name>`
    Toggle(String),
    /// `scripts` — list loaded and running scripts
    List,
    /// `press <combo>` — inject a key chord
    Press(KeyCombo),
    /// `quit`
    Quit,
}

const USAGE: &str = "commands: playscript <name> | stopscript <name> | togglescript <name> | scripts | press <combo> | quit";

/// Parse one console line. `Err` carries the usage message to show the user.
pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Err(USAGE.to_string());
    };
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(USAGE.to_string());
    }

    match (verb.to_ascii_lowercase().as_str(), arg) {
        ("playscript", Some(name)) => Ok(ConsoleCommand::Play(name.to_string())),
        ("stopscript", Some(name)) => Ok(ConsoleCommand::Stop(name.to_string())),
        ("togglescript", Some(name)) => Ok(ConsoleCommand::Toggle(name.to_string())),
        ("scripts", None) => Ok(ConsoleCommand::List),
        ("press", Some(combo)) => combo
            .parse::<KeyCombo>()
            .map(ConsoleCommand::Press)
            .map_err(|e| format!("{e}\n{USAGE}")),
        ("quit", None) | ("exit", None) => Ok(ConsoleCommand::Quit),
        _ => Err(USAGE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moonglow_events::KeyCode;

    #[test]
    fn parses_script_commands() {
        assert_eq!(
            parse("playscript heal.rhai"),
            Ok(ConsoleCommand::Play("heal.rhai".into()))
        );
        assert_eq!(
            parse("stopscript mine.scr"),
            Ok(ConsoleCommand::Stop("mine.scr".into()))
        );
        assert_eq!(
            parse("TOGGLESCRIPT a.scr"),
            Ok(ConsoleCommand::Toggle("a.scr".into()))
        );
    }

    #[test]
    fn parses_press() {
        match parse("press ctrl+f1") {
            Ok(ConsoleCommand::Press(combo)) => {
                assert_eq!(combo.code, KeyCode::F(1));
                assert!(combo.modifiers.ctrl);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn malformed_input_yields_usage() {
        assert!(parse("").is_err());
        assert!(parse("playscript").is_err());
        assert!(parse("playscript a b").is_err());
        assert!(parse("frobnicate x").is_err());
        assert!(parse("press notakey").is_err());
    }
}
