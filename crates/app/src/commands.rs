use std::str::FromStr;

use quartet_core::Part;

/// A line typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Toggle(Part),
    ToggleAll,
    Status,
    Reload,
    Quit,
}

impl FromStr for Input {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let input = match line {
            "a" | "all" => Input::ToggleAll,
            "s" | "status" => Input::Status,
            "r" | "reload" => Input::Reload,
            "q" | "quit" => Input::Quit,
            _ => {
                let part = line
                    .parse::<usize>()
                    .ok()
                    .and_then(Part::from_index)
                    .or_else(|| Part::REAL.into_iter().find(|p| p.name() == line));
                match part {
                    Some(part) if !part.is_aggregate() => Input::Toggle(part),
                    Some(_) => Input::ToggleAll,
                    None => return Err(format!("unknown command '{line}' (0-3, a, s, r, q)")),
                }
            }
        };
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parts() {
        assert_eq!("0".parse::<Input>(), Ok(Input::Toggle(Part::Drum)));
        assert_eq!(" 3 \n".parse::<Input>(), Ok(Input::Toggle(Part::Melody)));
        assert_eq!("bass".parse::<Input>(), Ok(Input::Toggle(Part::Bass)));
        assert_eq!("4".parse::<Input>(), Ok(Input::ToggleAll));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("a".parse::<Input>(), Ok(Input::ToggleAll));
        assert_eq!("s".parse::<Input>(), Ok(Input::Status));
        assert_eq!("reload".parse::<Input>(), Ok(Input::Reload));
        assert_eq!("q".parse::<Input>(), Ok(Input::Quit));
    }

    #[test]
    fn test_parse_unknown() {
        assert!("9".parse::<Input>().is_err());
        assert!("play".parse::<Input>().is_err());
    }
}
