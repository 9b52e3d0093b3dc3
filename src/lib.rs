pub mod config;
pub mod console;
pub mod error;
pub mod routes;
pub mod state;
pub mod views;

pub mod crypto {
    pub mod password;
    pub mod session_key;
    pub mod token;
}

pub mod models {
    pub mod file;
    pub mod query;
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod catalog;
    pub mod codec;
    pub mod file;
    pub mod layout;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod mail;
}

pub mod handlers {
    pub mod auth;
    pub mod files;
    pub mod search;
    pub mod users;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod media;
    pub mod user;
}
