
pub mod core {
    pub mod config;
    pub mod error;
    pub mod fail;
    pub mod runner;
    pub mod spec;
    pub mod tree;
}


pub mod checks {
    pub mod templates;
}


pub mod functional;
pub mod reporters;
