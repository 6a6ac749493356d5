//! Agent and customer reference data, and the acting role.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Appointment, EscrowPayment, Ether, ProfileId, WalletAddress};

/// Which side of the marketplace a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Service provider; receives released funds.
    Agent,
    /// Books and pays for appointments.
    Customer,
}

impl Role {
    /// Returns the string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Customer => "customer",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "customer" => Ok(Self::Customer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user triggering an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    /// Role of the acting user.
    pub role: Role,
    /// Profile of the acting user.
    pub profile_id: ProfileId,
}

impl Actor {
    /// Creates an actor acting as a customer.
    #[must_use]
    pub const fn customer(profile_id: ProfileId) -> Self {
        Self {
            role: Role::Customer,
            profile_id,
        }
    }

    /// Creates an actor acting as an agent.
    #[must_use]
    pub const fn agent(profile_id: ProfileId) -> Self {
        Self {
            role: Role::Agent,
            profile_id,
        }
    }

    /// Returns `true` if this actor is the appointment's party for its role.
    #[must_use]
    pub fn is_party_to(&self, appointment: &Appointment) -> bool {
        match self.role {
            Role::Agent => appointment.agent_id == self.profile_id,
            Role::Customer => appointment.customer_id == self.profile_id,
        }
    }
}

/// An agent as seen by the escrow core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentProfile {
    /// Profile identifier.
    pub id: ProfileId,
    /// Display name.
    pub full_name: String,
    /// Payment destination for released funds.
    pub wallet_id: WalletAddress,
    /// Price of one appointment, in ether.
    pub charges: Ether,
}

/// A customer as seen by the escrow core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CustomerProfile {
    /// Profile identifier.
    pub id: ProfileId,
    /// Display name.
    pub full_name: String,
    /// Destination for refunds.
    pub wallet_id: WalletAddress,
}

/// An appointment joined with everything the payment core needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AppointmentDetails {
    /// The appointment itself.
    pub appointment: Appointment,
    /// The booked agent.
    pub agent: AgentProfile,
    /// The booking customer.
    pub customer: CustomerProfile,
    /// Escrow row, once a payment was made.
    pub escrow_payment: Option<EscrowPayment>,
}
