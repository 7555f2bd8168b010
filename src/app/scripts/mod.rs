pub mod client_generator;
pub mod identifier_resolution;
pub mod opds_import;
pub mod redo_oclc;
pub mod viaf_names;

pub use client_generator::IntegrationClientGeneratorScript;
pub use identifier_resolution::IdentifierResolutionCoverageProvider;
pub use opds_import::OPDSImportScript;
pub use redo_oclc::RedoOCLCForThreeMScript;
pub use viaf_names::FillInVIAFNamesScript;
