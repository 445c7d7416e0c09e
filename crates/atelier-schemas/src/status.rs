//! Status columns.
//!
//! Every status is persisted as a lower snake_case string; `as_str` and
//! `parse` are the only conversions between the enum and its column value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A status column held a value no enum variant maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} status: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownStatus {}

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum! {
    /// Catalog order payment state.
    OrderStatus ("order") {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
    }
}

status_enum! {
    /// Review state of an uploaded payment proof.
    ProofStatus ("payment proof") {
        Submitted => "submitted",
        Approved => "approved",
        Rejected => "rejected",
    }
}

status_enum! {
    CustomOrderStatus ("custom order") {
        Draft => "draft",
        Pending => "pending",
        Quoted => "quoted",
        Accepted => "accepted",
        InProduction => "in_production",
        Completed => "completed",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
}

status_enum! {
    ArtisanStatus ("artisan") {
        Pending => "pending",
        Active => "active",
        Suspended => "suspended",
    }
}

status_enum! {
    TradeInStatus ("trade-in") {
        Submitted => "submitted",
        Offered => "offered",
        Accepted => "accepted",
        Declined => "declined",
        Rejected => "rejected",
        Completed => "completed",
    }
}

status_enum! {
    /// Only `Active` products are visible on the storefront.
    ProductStatus ("product") {
        Draft => "draft",
        Active => "active",
        Archived => "archived",
    }
}

status_enum! {
    /// What a verification code proves ownership of.
    CodePurpose ("code purpose") {
        ArtisanEmail => "artisan_email",
        CustomerEmail => "customer_email",
    }
}

status_enum! {
    /// Who wrote a concierge message.
    Author ("message author") {
        Customer => "customer",
        Concierge => "concierge",
    }
}

impl CustomOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl TradeInStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Declined | Self::Rejected | Self::Completed
        )
    }
}
