//! Note table — the fixed chromatic octave the instrument can play.

use serde::Serialize;

use crate::error::EngineError;

/// C4..C5, rounded to hundredths of a hertz.
pub const CHROMATIC_OCTAVE: [(&str, f64); 13] = [
    ("C4", 261.63),
    ("C#4", 277.18),
    ("D4", 293.66),
    ("D#4", 311.13),
    ("E4", 329.63),
    ("F4", 349.23),
    ("F#4", 369.99),
    ("G4", 392.00),
    ("G#4", 415.30),
    ("A4", 440.00),
    ("A#4", 466.16),
    ("B4", 493.88),
    ("C5", 523.25),
];

/// A playable note: its name and fundamental frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDefinition {
    pub name: String,
    pub fundamental_hz: f64,
}

impl NoteDefinition {
    pub fn new(name: impl Into<String>, fundamental_hz: f64) -> Self {
        NoteDefinition {
            name: name.into(),
            fundamental_hz,
        }
    }
}

/// An ordered, validated sequence of notes.
///
/// Names are unique and frequencies are positive and strictly increasing.
#[derive(Debug, Clone)]
pub struct NoteSet {
    notes: Vec<NoteDefinition>,
}

impl NoteSet {
    pub fn new(notes: Vec<NoteDefinition>) -> Result<Self, EngineError> {
        if notes.is_empty() {
            return Err(EngineError::InvalidNoteSet("no notes".to_string()));
        }
        for (i, note) in notes.iter().enumerate() {
            if !(note.fundamental_hz.is_finite() && note.fundamental_hz > 0.0) {
                return Err(EngineError::InvalidNoteSet(format!(
                    "{} has non-positive frequency {}",
                    note.name, note.fundamental_hz
                )));
            }
            if notes[..i].iter().any(|n| n.name == note.name) {
                return Err(EngineError::InvalidNoteSet(format!(
                    "duplicate note name {}",
                    note.name
                )));
            }
            if i > 0 && note.fundamental_hz <= notes[i - 1].fundamental_hz {
                return Err(EngineError::InvalidNoteSet(format!(
                    "{} is not higher than {}",
                    note.name,
                    notes[i - 1].name
                )));
            }
        }
        Ok(NoteSet { notes })
    }

    /// The 13-note chromatic octave from C4 to C5.
    pub fn chromatic_octave() -> Self {
        NoteSet {
            notes: CHROMATIC_OCTAVE
                .iter()
                .map(|&(name, hz)| NoteDefinition::new(name, hz))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&NoteDefinition> {
        self.notes.iter().find(|n| n.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoteDefinition> {
        self.notes.iter()
    }

    pub fn as_slice(&self) -> &[NoteDefinition] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl Default for NoteSet {
    fn default() -> Self {
        NoteSet::chromatic_octave()
    }
}
