use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of Open Finance participant a `Resource` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
	Bank,
	CreditUnion,
	Fintech,
	PaymentInstitution,
	CreditProvider,
	InvestmentFirm,
	InsuranceCompany,
	Broker,
	PensionFund,
	Other,
}

/// Lifecycle state of a `Resource`. Transitions follow the graph documented
/// on `ResourceStatus::can_transition_to`; the core never moves a resource
/// out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
	Discovered,
	Validating,
	Active,
	TemporarilyUnavailable,
	Maintenance,
	Degraded,
	ValidationFailed,
	Inactive,
	Deprecated,
	Removed,
}

impl ResourceStatus {
	/// Terminal states are never left once entered.
	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			ResourceStatus::Deprecated | ResourceStatus::Removed | ResourceStatus::Inactive
		)
	}

	/// Whether `self -> next` is a legal transition.
	pub fn can_transition_to(self, next: ResourceStatus) -> bool {
		if self.is_terminal() {
			return false;
		}
		// Any non-terminal state may move to a terminal one.
		if next.is_terminal() {
			return true;
		}
		use ResourceStatus::*;
		matches!(
			(self, next),
			(Discovered, Validating)
				| (Validating, Active)
				| (Validating, ValidationFailed)
				| (Active, Degraded)
				| (Active, TemporarilyUnavailable)
				| (Active, Maintenance)
				| (Degraded, Active)
				| (TemporarilyUnavailable, Active)
				| (Maintenance, Active)
		)
	}
}

/// An immutable snapshot of a remote Open Finance participant's published
/// set of API endpoints. Mutation never happens in place; a new snapshot is
/// produced and persisted via the repository port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
	pub resource_id: String,
	pub organization_id: String,
	pub resource_type: ResourceType,
	pub status: ResourceStatus,
	pub discovered_at: DateTime<Utc>,
	pub last_synced_at: Option<DateTime<Utc>>,
	pub last_validated_at: Option<DateTime<Utc>>,
	pub last_monitored_at: Option<DateTime<Utc>>,
}

impl Resource {
	pub fn new(resource_id: impl Into<String>, organization_id: impl Into<String>, resource_type: ResourceType) -> Self {
		Self {
			resource_id: resource_id.into(),
			organization_id: organization_id.into(),
			resource_type,
			status: ResourceStatus::Discovered,
			discovered_at: Utc::now(),
			last_synced_at: None,
			last_validated_at: None,
			last_monitored_at: None,
		}
	}

	/// Produce a new snapshot with `status` set, enforcing the transition
	/// graph. Returns `None` on an illegal transition; callers must not
	/// silently persist an invalid snapshot.
	pub fn with_status(&self, next: ResourceStatus) -> Option<Self> {
		if !self.status.can_transition_to(next) {
			return None;
		}
		let mut out = self.clone();
		out.status = next;
		Some(out)
	}

	pub fn with_synced_now(&self) -> Self {
		let mut out = self.clone();
		out.last_synced_at = Some(Utc::now());
		out
	}

	pub fn with_validated_now(&self) -> Self {
		let mut out = self.clone();
		out.last_validated_at = Some(Utc::now());
		out
	}

	pub fn with_monitored_now(&self) -> Self {
		let mut out = self.clone();
		out.last_monitored_at = Some(Utc::now());
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn discovered_to_validating_is_legal() {
		let r = Resource::new("r1", "org1", ResourceType::Bank);
		let r2 = r.with_status(ResourceStatus::Validating).unwrap();
		assert_eq!(r2.status, ResourceStatus::Validating);
	}

	#[test]
	fn terminal_state_never_moves() {
		let r = Resource::new("r1", "org1", ResourceType::Bank);
		let removed = r.with_status(ResourceStatus::Removed).unwrap();
		assert!(removed.with_status(ResourceStatus::Active).is_none());
		assert!(removed.with_status(ResourceStatus::Degraded).is_none());
	}

	#[test]
	fn active_cycles_through_degraded_and_back() {
		let r = Resource::new("r1", "org1", ResourceType::Bank)
			.with_status(ResourceStatus::Validating)
			.unwrap()
			.with_status(ResourceStatus::Active)
			.unwrap();
		let degraded = r.with_status(ResourceStatus::Degraded).unwrap();
		let active_again = degraded.with_status(ResourceStatus::Active).unwrap();
		assert_eq!(active_again.status, ResourceStatus::Active);
	}

	#[test]
	fn discovered_cannot_jump_to_active() {
		let r = Resource::new("r1", "org1", ResourceType::Bank);
		assert!(r.with_status(ResourceStatus::Active).is_none());
	}
}
