use std::fmt;

/// Lifecycle status of a repair order. Raw status text from storage is
/// normalized (trim + uppercase) on parse; anything unrecognized is carried
/// through as `Other` rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    ToSend,
    WaitingQuote,
    Approved,
    BeingRepaired,
    Shipping,
    CurrentlyBeingShipped,
    Received,
    Paid,
    PaymentSent,
    Ber,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// Part is somewhere between intake and delivery.
    InFlight,
    /// Part is back; invoice follow-up remains.
    Payment,
    /// Nothing left to do (settled or scrapped).
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusClass {
    pub terminal: bool,
    pub category: StatusCategory,
}

impl Status {
    pub fn parse(raw: &str) -> Status {
        let normalized = raw.trim().to_uppercase();
        match normalized.as_str() {
            "TO SEND" => Status::ToSend,
            "WAITING QUOTE" => Status::WaitingQuote,
            "APPROVED" => Status::Approved,
            "BEING REPAIRED" => Status::BeingRepaired,
            "SHIPPING" => Status::Shipping,
            "CURRENTLY BEING SHIPPED" => Status::CurrentlyBeingShipped,
            "RECEIVED" => Status::Received,
            "BER" => Status::Ber,
            _ if normalized.starts_with("PAYMENT SENT") => Status::PaymentSent,
            _ if normalized.starts_with("PAID") => Status::Paid,
            _ => Status::Other(normalized),
        }
    }

    /// The one classification table; every terminal/active check in the
    /// crate goes through here.
    pub fn classification(&self) -> StatusClass {
        match self {
            Status::Paid => StatusClass {
                terminal: false,
                category: StatusCategory::Payment,
            },
            Status::PaymentSent | Status::Ber => StatusClass {
                terminal: true,
                category: StatusCategory::Closed,
            },
            _ => StatusClass {
                terminal: false,
                category: StatusCategory::InFlight,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.classification().terminal
    }

    /// PAID-class statuses derive their follow-up from payment terms
    /// instead of a fixed offset.
    pub fn is_paid_class(&self) -> bool {
        self.classification().category == StatusCategory::Payment
    }

    /// A history entry with this status closes out the order for turnaround
    /// purposes.
    pub fn is_completion(&self) -> bool {
        self.is_terminal() || self.is_paid_class()
    }

    pub fn label(&self) -> &str {
        match self {
            Status::ToSend => "TO SEND",
            Status::WaitingQuote => "WAITING QUOTE",
            Status::Approved => "APPROVED",
            Status::BeingRepaired => "BEING REPAIRED",
            Status::Shipping => "SHIPPING",
            Status::CurrentlyBeingShipped => "CURRENTLY BEING SHIPPED",
            Status::Received => "RECEIVED",
            Status::Paid => "PAID",
            Status::PaymentSent => "PAYMENT SENT",
            Status::Ber => "BER",
            Status::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
