pub mod assign_validation;
pub mod config_mutator;
pub mod destination_creator;
pub mod do_not_generate;
pub mod redirect;
