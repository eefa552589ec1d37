//! Console commands read from stdin

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enable debug for one service, or globally
    Enable(Option<String>),
    /// Disable debug for one service, or everything
    Disable(Option<String>),
    Register(String),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "commands: enable [service] | disable [service] | register <service> | status | help | quit";

impl Command {
    /// Parse one input line. Returns Ok(None) for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next().map(str::to_string);

        if words.next().is_some() {
            return Err(format!("too many arguments for '{verb}'"));
        }

        let command = match verb.to_ascii_lowercase().as_str() {
            "enable" | "on" => Self::Enable(arg),
            "disable" | "off" => Self::Disable(arg),
            "register" => match arg {
                Some(name) => Self::Register(name),
                None => return Err("register needs a service name".into()),
            },
            "status" if arg.is_none() => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}'")),
        };

        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_enable_forms() {
        assert_eq!(Command::parse("enable"), Ok(Some(Command::Enable(None))));
        assert_eq!(
            Command::parse("  ENABLE svc-a "),
            Ok(Some(Command::Enable(Some("svc-a".into()))))
        );
        assert_eq!(
            Command::parse("off svc-b"),
            Ok(Some(Command::Disable(Some("svc-b".into()))))
        );
    }

    #[test]
    fn parse_blank_line() {
        assert_eq!(Command::parse(""), Ok(None));
        assert_eq!(Command::parse("   \t"), Ok(None));
    }

    #[test]
    fn register_requires_name() {
        assert!(Command::parse("register").is_err());
        assert_eq!(
            Command::parse("register svc-c"),
            Ok(Some(Command::Register("svc-c".into())))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(Command::parse("launch rockets").is_err());
        assert!(Command::parse("enable a b").is_err());
        assert!(Command::parse("status now").is_err());
    }
}
