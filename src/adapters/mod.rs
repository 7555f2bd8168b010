// Adapters layer: the wrangler's upstream services and the wire formats they speak.

pub mod content_server;
pub mod http;
pub mod oclc;
pub mod opds;
pub mod viaf;
pub mod xml;
