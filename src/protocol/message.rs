//! Protocol message definitions
//!
//! Typed requests, replies and callbacks exchanged with the bank server.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operation codes understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
    Open = 1,
    Close = 2,
    CheckBalance = 3,
    Deposit = 4,
    Withdraw = 5,
    Transfer = 6,
    Exchange = 7,
    Monitor = 8,
}

impl OpCode {
    /// Wire value of the op code
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Open => "open",
            OpCode::Close => "close",
            OpCode::CheckBalance => "check",
            OpCode::Deposit => "deposit",
            OpCode::Withdraw => "withdraw",
            OpCode::Transfer => "transfer",
            OpCode::Exchange => "exchange",
            OpCode::Monitor => "monitor",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reply status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Success,
    Fail,
    Error,
    /// Reserved by the server for pushed updates, never used for direct replies
    Callback,
    /// Any code outside 1..=4
    Unknown(i32),
}

impl Status {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Status::Success,
            2 => Status::Fail,
            3 => Status::Error,
            4 => Status::Callback,
            other => Status::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Status::Success => 1,
            Status::Fail => 2,
            Status::Error => 3,
            Status::Callback => 4,
            Status::Unknown(code) => code,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => f.write_str("Success"),
            Status::Fail => f.write_str("Fail"),
            Status::Error => f.write_str("Error"),
            // Only the first three codes have a label of their own
            Status::Callback | Status::Unknown(_) => f.write_str("Response"),
        }
    }
}

/// Currency units supported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Usd,
    Rmb,
    Sgd,
    Jpy,
    Bpd,
}

impl Currency {
    pub const ALL: [Currency; 5] = [
        Currency::Usd,
        Currency::Rmb,
        Currency::Sgd,
        Currency::Jpy,
        Currency::Bpd,
    ];

    /// Token transmitted on the wire
    pub fn token(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Rmb => "RMB",
            Currency::Sgd => "SGD",
            Currency::Jpy => "JPY",
            Currency::Bpd => "BPD",
        }
    }
}

// The server reads currencies as text fields, so serialize the token itself.
impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown currency '{0}' (expected one of usd, rmb, sgd, jpy, bpd)")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Currency::ALL
            .into_iter()
            .find(|c| c.token().eq_ignore_ascii_case(token))
            .ok_or_else(|| UnknownCurrency(token.to_string()))
    }
}

/// A logical request, one variant per operation
///
/// Field order inside each variant is the order the server reads them.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Open {
        name: String,
        password: String,
        initial_balance: f32,
        currency: Currency,
    },
    Close {
        account_id: i32,
        name: String,
        password: String,
    },
    CheckBalance {
        account_id: i32,
        name: String,
        password: String,
        currency: Currency,
    },
    Deposit {
        account_id: i32,
        name: String,
        password: String,
        currency: Currency,
        amount: f32,
    },
    Withdraw {
        account_id: i32,
        name: String,
        password: String,
        currency: Currency,
        amount: f32,
    },
    Transfer {
        sender_id: i32,
        name: String,
        password: String,
        currency: Currency,
        amount: f32,
        receiver_id: i32,
    },
    Exchange {
        account_id: i32,
        name: String,
        password: String,
        from_currency: Currency,
        to_currency: Currency,
        amount: f32,
    },
    Monitor {
        /// Window length in milliseconds
        duration_ms: i64,
    },
}

impl Operation {
    pub fn op_code(&self) -> OpCode {
        match self {
            Operation::Open { .. } => OpCode::Open,
            Operation::Close { .. } => OpCode::Close,
            Operation::CheckBalance { .. } => OpCode::CheckBalance,
            Operation::Deposit { .. } => OpCode::Deposit,
            Operation::Withdraw { .. } => OpCode::Withdraw,
            Operation::Transfer { .. } => OpCode::Transfer,
            Operation::Exchange { .. } => OpCode::Exchange,
            Operation::Monitor { .. } => OpCode::Monitor,
        }
    }
}

/// A decoded direct reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// Id echoed by the server
    pub id: u32,
    pub status: Status,
    pub message: String,
    /// Invalid UTF-8 in the payload was replaced
    pub lossy: bool,
}

/// A decoded server-pushed update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Callback {
    pub message: String,
    pub lossy: bool,
}

/// Anything the server can send to the client
///
/// The transport does not tell these apart; the caller picks the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Response(Response),
    Callback(Callback),
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<Callback> for Reply {
    fn from(callback: Callback) -> Self {
        Reply::Callback(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_code_values() {
        assert_eq!(OpCode::Open.code(), 1);
        assert_eq!(OpCode::Deposit.code(), 4);
        assert_eq!(OpCode::Monitor.code(), 8);
        assert_eq!(OpCode::CheckBalance.to_string(), "check");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::from_code(1), Status::Success);
        assert_eq!(Status::from_code(2), Status::Fail);
        assert_eq!(Status::from_code(3), Status::Error);
        assert_eq!(Status::from_code(4), Status::Callback);
        assert_eq!(Status::from_code(42), Status::Unknown(42));
        assert_eq!(Status::Unknown(42).code(), 42);
        assert_eq!(Status::Unknown(42).to_string(), "Response");
        assert_eq!(Status::Callback.to_string(), "Response");
        assert_eq!(Status::Fail.to_string(), "Fail");
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!(" JPY ".parse::<Currency>().unwrap(), Currency::Jpy);
        assert_eq!("Bpd".parse::<Currency>().unwrap(), Currency::Bpd);
        assert!("eur".parse::<Currency>().is_err());
        assert_eq!(Currency::Sgd.to_string(), "SGD");
    }

    #[test]
    fn test_operation_op_codes() {
        let op = Operation::Monitor { duration_ms: 10 };
        assert_eq!(op.op_code(), OpCode::Monitor);

        let op = Operation::Transfer {
            sender_id: 1,
            name: "a".into(),
            password: "b".into(),
            currency: Currency::Usd,
            amount: 1.0,
            receiver_id: 2,
        };
        assert_eq!(op.op_code(), OpCode::Transfer);
    }
}
