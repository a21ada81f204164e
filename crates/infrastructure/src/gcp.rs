//! Google Cloud REST adapters for table grants, warehouse views and group lookups.

mod bigquery_iam_grant_backend;
mod bigquery_warehouse_backend;
mod google_groups_directory;
mod rest_client;
mod token_source;

pub use bigquery_iam_grant_backend::BigQueryIamGrantBackend;
pub use bigquery_warehouse_backend::BigQueryWarehouseBackend;
pub use google_groups_directory::GoogleGroupsDirectory;
pub use rest_client::GcpRestClient;
pub use token_source::GcpTokenSource;
