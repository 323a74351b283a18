use std::fmt;

/// One of the instrument slots of a composition, plus the virtual
/// "all parts" aggregate that represents synchronized group playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Part {
    Drum = 0,
    Bass = 1,
    Guitar = 2,
    Melody = 3,
    All = 4,
}

impl Part {
    /// The real parts, in the order used to pick the phase reference of a group.
    pub const REAL: [Part; 4] = [Part::Drum, Part::Bass, Part::Guitar, Part::Melody];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Part> {
        match index {
            0 => Some(Part::Drum),
            1 => Some(Part::Bass),
            2 => Some(Part::Guitar),
            3 => Some(Part::Melody),
            4 => Some(Part::All),
            _ => None,
        }
    }

    pub fn is_aggregate(self) -> bool {
        self == Part::All
    }

    pub fn name(self) -> &'static str {
        match self {
            Part::Drum => "drum",
            Part::Bass => "bass",
            Part::Guitar => "guitar",
            Part::Melody => "melody",
            Part::All => "all",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for index in 0..5 {
            let part = Part::from_index(index).unwrap();
            assert_eq!(part.index(), index);
        }
        assert_eq!(Part::from_index(5), None);
    }

    #[test]
    fn test_real_parts_exclude_aggregate() {
        assert!(Part::REAL.iter().all(|p| !p.is_aggregate()));
        assert!(Part::All.is_aggregate());
        assert_eq!(Part::REAL[0], Part::Drum);
    }

    #[test]
    fn test_display() {
        assert_eq!(Part::Guitar.to_string(), "guitar");
        assert_eq!(format!("{}", Part::All), "all");
    }
}
