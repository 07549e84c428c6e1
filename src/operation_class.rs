use serde::{Deserialize, Serialize};

/// The six independently-gated classes of work the core schedules. Discovery,
/// Sync, Validation and Monitoring are the four operation classes proper;
/// `ApiCall` and `BatchProcessing` gate cross-cutting concerns shared by all
/// of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationClass {
	Discovery,
	Sync,
	Validation,
	Monitoring,
	ApiCall,
	BatchProcessing,
}

impl OperationClass {
	pub const ALL: [OperationClass; 6] = [
		OperationClass::Discovery,
		OperationClass::Sync,
		OperationClass::Validation,
		OperationClass::Monitoring,
		OperationClass::ApiCall,
		OperationClass::BatchProcessing,
	];

	/// The four operation classes proper, summed by the adaptive controller
	/// for its global-concurrency accounting.
	pub const SCHEDULED: [OperationClass; 4] = [
		OperationClass::Discovery,
		OperationClass::Sync,
		OperationClass::Validation,
		OperationClass::Monitoring,
	];

	/// Every class the adaptive controller resizes each tick. `BatchProcessing`
	/// is excluded: its capacity is fixed at 10 and never moved by C3.
	pub const RESIZABLE: [OperationClass; 5] = [
		OperationClass::Discovery,
		OperationClass::Sync,
		OperationClass::Validation,
		OperationClass::Monitoring,
		OperationClass::ApiCall,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			OperationClass::Discovery => "discovery",
			OperationClass::Sync => "sync",
			OperationClass::Validation => "validation",
			OperationClass::Monitoring => "monitoring",
			OperationClass::ApiCall => "api_call",
			OperationClass::BatchProcessing => "batch_processing",
		}
	}
}

impl std::fmt::Display for OperationClass {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}
