pub mod directory_client;
pub mod institution_client;
pub mod repository;

pub use directory_client::{DirectoryClientPort, DiscoveredResource};
pub use institution_client::{
	InstitutionClientPort, InstitutionResponse, RequestHeaders, ResilienceConfig, ResilientInstitutionClient,
};
pub use repository::RepositoryPort;
