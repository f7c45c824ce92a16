//! Built-in strategies, ranked by how common the remote server is.

use std::sync::Arc;

use super::detection::Refinement;
use super::{GeneratedIndexPageScraper, OptOutScraper, RemoteServerProfile, Scraper};

pub const NEXUS_ID: &str = "nexus";
pub const AMAZON_S3_ID: &str = "amazon-s3";
pub const APACHE_INDEX_ID: &str = "apache-index";
pub const NGINX_INDEX_ID: &str = "nginx-index";
pub const GENERIC_INDEX_ID: &str = "generic-index";

const NGINX_PARENT: &str = "../";
const APACHE_PARENT: &str = "Parent Directory";

pub fn nexus() -> OptOutScraper {
    OptOutScraper::new(RemoteServerProfile::new(NEXUS_ID, 1000, "Nexus Repository Manager"))
        .with_refinement(Refinement::server_starts_with("Nexus/"))
}

pub fn amazon_s3() -> OptOutScraper {
    OptOutScraper::new(RemoteServerProfile::new(AMAZON_S3_ID, 2000, "Amazon S3 Bucket"))
        .with_refinement(Refinement::server_starts_with("AmazonS3"))
}

pub fn apache_index() -> GeneratedIndexPageScraper {
    GeneratedIndexPageScraper::new(RemoteServerProfile::new(
        APACHE_INDEX_ID,
        3000,
        "Apache httpd Index Page",
    ))
    .with_parent_marker(APACHE_PARENT)
    .with_refinement(Refinement::server_starts_with("Apache"))
}

pub fn nginx_index() -> GeneratedIndexPageScraper {
    GeneratedIndexPageScraper::new(RemoteServerProfile::new(
        NGINX_INDEX_ID,
        5000,
        "Nginx Index Page",
    ))
    .with_parent_marker(NGINX_PARENT)
    .with_refinement(Refinement::server_starts_with("nginx/"))
}

/// Weakest match: any generated-looking index, whatever the server says.
pub fn generic_index() -> GeneratedIndexPageScraper {
    GeneratedIndexPageScraper::new(RemoteServerProfile::new(
        GENERIC_INDEX_ID,
        10000,
        "Generic Index Page",
    ))
    .with_parent_marker(NGINX_PARENT)
    .with_parent_marker(APACHE_PARENT)
}

pub fn default_scrapers() -> Vec<Arc<dyn Scraper>> {
    vec![
        Arc::new(nexus()),
        Arc::new(amazon_s3()),
        Arc::new(apache_index()),
        Arc::new(nginx_index()),
        Arc::new(generic_index()),
    ]
}
