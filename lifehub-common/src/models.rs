//! Domain enums shared by the REST modules
//!
//! Every enum is stored as TEXT and serialized as the same snake_case token
//! on the wire, so a value read from the database can be echoed to a client
//! without translation.

use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                #[sqlx(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire and storage representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("'{}' is not a valid choice", other)),
                }
            }
        }
    };
}

text_enum!(
    /// UI theme preference
    Theme { Light => "light", Dark => "dark", Auto => "auto" }
);

impl Default for Theme {
    fn default() -> Self {
        Theme::Auto
    }
}

text_enum!(
    ProjectStatus {
        Planning => "planning",
        Active => "active",
        Completed => "completed",
        Archived => "archived",
    }
);

text_enum!(
    TaskPriority { High => "high", Medium => "medium", Low => "low" }
);

impl TaskPriority {
    /// Sort rank, most urgent first
    pub fn rank(&self) -> i32 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 2,
        }
    }
}

text_enum!(
    /// Task workflow state
    TaskStatus {
        Todo => "todo",
        InProgress => "in_progress",
        Blocked => "blocked",
        Completed => "completed",
    }
);

text_enum!(
    EventType { Work => "work", Life => "life", Health => "health" }
);

text_enum!(
    /// Phase of a pomodoro cycle
    SessionType { Work => "work", Break => "break", LongBreak => "long_break" }
);

text_enum!(
    NoteFormat { RichText => "richtext", Markdown => "markdown" }
);

text_enum!(
    ResourceType {
        Document => "document",
        Image => "image",
        Video => "video",
        Audio => "audio",
        Other => "other",
    }
);

text_enum!(
    /// Courier progress of a tracked package
    PackageState {
        Pending => "pending",
        InTransit => "in_transit",
        OutForDelivery => "out_for_delivery",
        Delivered => "delivered",
    }
);

impl PackageState {
    /// Next courier stage, `None` once delivered
    pub fn advance(&self) -> Option<(PackageState, &'static str)> {
        match self {
            PackageState::Pending => Some((PackageState::InTransit, "Transit center")),
            PackageState::InTransit => Some((PackageState::OutForDelivery, "Delivery station")),
            PackageState::OutForDelivery => Some((PackageState::Delivered, "Signed for")),
            PackageState::Delivered => None,
        }
    }
}

text_enum!(
    MealType {
        Breakfast => "breakfast",
        Lunch => "lunch",
        Dinner => "dinner",
        Snack => "snack",
    }
);

text_enum!(
    TransactionType { Income => "income", Expense => "expense" }
);

text_enum!(
    /// Category of a ledger transaction
    TransactionCategory {
        Food => "food",
        Transport => "transport",
        Shopping => "shopping",
        Entertainment => "entertainment",
        Health => "health",
        Education => "education",
        Housing => "housing",
        Salary => "salary",
        Bonus => "bonus",
        Investment => "investment",
        Other => "other",
    }
);

text_enum!(
    /// Spending categories a budget can cover
    BudgetCategory {
        Food => "food",
        Transport => "transport",
        Shopping => "shopping",
        Entertainment => "entertainment",
        Health => "health",
        Education => "education",
        Housing => "housing",
        Other => "other",
    }
);

text_enum!(
    BudgetPeriod { Monthly => "monthly", Yearly => "yearly" }
);

text_enum!(
    /// OCR processing state
    OcrStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
);

impl OcrStatus {
    /// Whether a record may move from `self` to `next`
    ///
    /// Processing starts from any state except an in-flight run. A record
    /// never returns to `Pending`.
    pub fn can_transition_to(&self, next: OcrStatus) -> bool {
        match (self, next) {
            (_, OcrStatus::Pending) => false,
            (OcrStatus::Processing, OcrStatus::Processing) => false,
            (_, OcrStatus::Processing) => true,
            (OcrStatus::Processing, OcrStatus::Completed | OcrStatus::Failed) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_serde_and_text_agree() {
        for status in TaskStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
            assert_eq!(TaskStatus::from_str(status.as_str()).unwrap(), *status);
        }
        assert_eq!(SessionType::LongBreak.as_str(), "long_break");
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!(TaskPriority::from_str("urgent").is_err());
        assert!(OcrStatus::from_str("").is_err());
    }

    #[test]
    fn test_ocr_forward_transitions() {
        assert!(OcrStatus::Pending.can_transition_to(OcrStatus::Processing));
        assert!(OcrStatus::Processing.can_transition_to(OcrStatus::Completed));
        assert!(OcrStatus::Processing.can_transition_to(OcrStatus::Failed));
        // reprocessing
        assert!(OcrStatus::Failed.can_transition_to(OcrStatus::Processing));
        assert!(OcrStatus::Completed.can_transition_to(OcrStatus::Processing));
    }

    #[test]
    fn test_ocr_never_regresses_to_pending() {
        for from in OcrStatus::ALL {
            assert!(!from.can_transition_to(OcrStatus::Pending));
        }
        assert!(!OcrStatus::Pending.can_transition_to(OcrStatus::Completed));
        assert!(!OcrStatus::Processing.can_transition_to(OcrStatus::Processing));
    }

    #[test]
    fn test_package_advances_to_delivered() {
        let mut state = PackageState::Pending;
        let mut steps = 0;
        while let Some((next, _)) = state.advance() {
            state = next;
            steps += 1;
        }
        assert_eq!(state, PackageState::Delivered);
        assert_eq!(steps, 3);
    }

    #[test]
    fn test_priority_rank_orders_high_first() {
        assert!(TaskPriority::High.rank() < TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() < TaskPriority::Low.rank());
    }
}
