//! Metadata/access service client
//!
//! This module defines the service interface that resolves logical file
//! names, an HTTP implementation of it, and the resolver that turns a service
//! answer into a validated result.

pub mod http;
mod resolver;
mod service;

pub use http::HttpMetadataService;
pub use resolver::{FileMetadataResolver, ResolvedMetadata, REQUEST_ID_PREFIX};
pub use service::{
    AccessIntent, FileAccessRequest, FileAccessResponse, FilePartInfo, MetadataService,
    SharedMetadataService, StaticMetadataService,
};
