//! Line commands for the interactive harness.

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sign in as a user, resetting the collection.
    SignIn(String),
    /// Sign out, clearing the collection.
    SignOut,
    /// Create a bookmark (optimistic).
    Add { url: String, title: String },
    /// Delete a bookmark by id (optimistic).
    Remove(String),
    /// Print the ordered collection.
    List,
    /// Print the collection as JSON.
    Export,
    /// Print the current owner and feed state.
    State,
    /// Re-fetch the collection wholesale.
    Refresh,
    /// Re-subscribe the change feed.
    Resubscribe,
    Help,
    Quit,
}

impl Command {
    /// Parse a single input line. Whitespace-insensitive; the title of `add`
    /// may contain spaces.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let keyword = parts.next().ok_or("empty command")?;

        match keyword {
            "signin" => {
                let user = parts.next().ok_or("usage: signin <user>")?;
                Ok(Self::SignIn(user.to_string()))
            }
            "signout" => Ok(Self::SignOut),
            "add" => {
                let url = parts.next().ok_or("usage: add <url> <title>")?;
                let title = parts.collect::<Vec<_>>().join(" ");
                if title.is_empty() {
                    return Err("usage: add <url> <title>".into());
                }
                Ok(Self::Add {
                    url: url.to_string(),
                    title,
                })
            }
            "rm" => {
                let id = parts.next().ok_or("usage: rm <id>")?;
                Ok(Self::Remove(id.to_string()))
            }
            "ls" => Ok(Self::List),
            "export" => Ok(Self::Export),
            "state" => Ok(Self::State),
            "refresh" => Ok(Self::Refresh),
            "resubscribe" => Ok(Self::Resubscribe),
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command: {other} (try `help`)")),
        }
    }
}

/// Help text printed by the `help` command.
pub const HELP: &str = "\
commands:
  signin <user>      sign in and fetch the user's bookmarks
  signout            sign out and clear the view
  add <url> <title>  add a bookmark (applied optimistically)
  rm <id>            delete a bookmark by id
  ls                 list bookmarks, newest first
  export             dump the collection as JSON
  state              show owner and change feed state
  refresh            re-fetch the collection
  resubscribe        restart the change feed subscription
  quit               exit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signin() {
        assert_eq!(
            Command::parse("signin alice").unwrap(),
            Command::SignIn("alice".into())
        );
        assert!(Command::parse("signin").is_err());
    }

    #[test]
    fn test_parse_add_with_spaced_title() {
        assert_eq!(
            Command::parse("add https://a.com My first bookmark").unwrap(),
            Command::Add {
                url: "https://a.com".into(),
                title: "My first bookmark".into(),
            }
        );
    }

    #[test]
    fn test_parse_add_requires_title() {
        assert!(Command::parse("add https://a.com").is_err());
        assert!(Command::parse("add").is_err());
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("ls").unwrap(), Command::List);
        assert_eq!(Command::parse("signout").unwrap(), Command::SignOut);
        assert_eq!(Command::parse("state").unwrap(), Command::State);
        assert_eq!(Command::parse("refresh").unwrap(), Command::Refresh);
        assert_eq!(Command::parse("quit").unwrap(), Command::Quit);
        assert_eq!(Command::parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_is_whitespace_insensitive() {
        assert_eq!(
            Command::parse("  rm   local-123  ").unwrap(),
            Command::Remove("local-123".into())
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("   ").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }
}
