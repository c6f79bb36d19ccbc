use anyhow::{Result, anyhow};
use std::env;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub poll: Option<String>,   // -p/--poll <hours>
    pub config: Option<String>, // -c/--config <path>
    pub json: bool,             // --json
    pub quiet: bool,            // -q/--quiet
}

impl CliArgs {
    /// Parse command-line arguments
    pub fn parse() -> Result<Self> {
        let args: Vec<String> = env::args().collect();
        Self::parse_from(&args[1..])
    }

    /// Parse from a slice of arguments (for testing)
    pub fn parse_from(args: &[String]) -> Result<Self> {
        let mut result = CliArgs {
            poll: None,
            config: None,
            json: false,
            quiet: false,
        };

        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];

            match arg.as_str() {
                "-p" | "--poll" => {
                    i += 1;
                    if i >= args.len() {
                        return Err(anyhow!("{arg} requires a value"));
                    }
                    result.poll = Some(args[i].clone());
                }
                "-c" | "--config" => {
                    i += 1;
                    if i >= args.len() {
                        return Err(anyhow!("{arg} requires a value"));
                    }
                    result.config = Some(args[i].clone());
                }
                "--json" => {
                    result.json = true;
                }
                "-q" | "--quiet" => {
                    result.quiet = true;
                }
                unknown => {
                    return Err(anyhow!("Unknown argument: {unknown}"));
                }
            }

            i += 1;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_full_scan() {
        let args = CliArgs::parse_from(&[]).unwrap();
        assert!(args.poll.is_none());
        assert!(!args.json);
    }

    #[test]
    fn poll_takes_a_window() {
        let args = CliArgs::parse_from(&strings(&["--poll", "24", "--json"])).unwrap();
        assert_eq!(args.poll.as_deref(), Some("24"));
        assert!(args.json);
    }

    #[test]
    fn poll_without_value_is_an_error() {
        assert!(CliArgs::parse_from(&strings(&["-p"])).is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(CliArgs::parse_from(&strings(&["--verbose"])).is_err());
    }
}
