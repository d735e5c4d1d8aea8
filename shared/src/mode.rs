//! Tutoring / evaluation mode controller.
//!
//! The mode decides which instruction protocol is requested from the model on
//! each outbound turn, and whether the parser keeps flashcards.

use serde::{Deserialize, Serialize};

/// Conversational mode of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Socratic, simplified explanations with flashcards
    #[default]
    Tutoring,
    /// One question at a time, no hints, no flashcards
    Evaluation,
}

impl Mode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            Mode::Tutoring => Mode::Evaluation,
            Mode::Evaluation => Mode::Tutoring,
        }
    }

    /// Machine directive naming the protocol the model should follow.
    pub fn directive(self) -> &'static str {
        match self {
            Mode::Tutoring => "[SISTEMA: ACTIVAR PROTOCOLO 1: MODO VICTORIA ELI5]",
            Mode::Evaluation => "[SISTEMA: ACTIVAR PROTOCOLO 2: MODO EXAMEN]",
        }
    }

    /// Assistant message appended to the log when this mode becomes active.
    pub fn announcement(self) -> &'static str {
        match self {
            Mode::Tutoring => {
                "MODO VICTORIA ACTIVO: ¡Hola! Sigamos aprendiendo juntos de la forma más sencilla posible."
            }
            Mode::Evaluation => {
                "MODO EXAMEN ACTIVO: Protocolo de evaluación académica iniciado. Responderé a tus dudas una por una sin pistas."
            }
        }
    }

    pub fn allows_flashcards(self) -> bool {
        self == Mode::Tutoring
    }
}

/// Two-state toggle owning the current mode.
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    mode: Mode,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Flip the mode and return the announcement for the new one.
    pub fn toggle(&mut self) -> &'static str {
        self.mode = self.mode.toggled();
        self.mode.announcement()
    }

    /// Outbound text for a user turn: the content plus the current directive
    /// on its own line, unless the content already carries it.
    pub fn apply_directive(&self, content: &str) -> String {
        let directive = self.mode.directive();
        if content.contains(directive) {
            content.to_string()
        } else {
            format!("{}\n{}", content, directive)
        }
    }
}
