//! kportal configuration object and helpers.
mod controller;
mod loading;
mod namespaces;
mod object;

pub use self::controller::BackoffConf;
pub use self::controller::ControllerConf;
pub use self::loading::load;
pub use self::loading::Error;
pub use self::namespaces::LimitsConf;
pub use self::namespaces::NamespacesConf;
pub use self::object::AccessConf;
pub use self::object::AuthConf;
pub use self::object::BackendConf;
pub use self::object::Conf;
pub use self::object::CredentialsConf;
pub use self::object::RuntimeConf;
pub use self::object::SyncConf;
pub use self::object::TimeoutsConf;
