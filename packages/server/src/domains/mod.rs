// Domain modules - business logic organized by domain
pub mod auth;
pub mod formation;
pub mod formation_assignment;
pub mod formation_constraint;
pub mod participant;
pub mod webhook;
