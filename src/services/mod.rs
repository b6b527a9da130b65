pub mod lease_engine;
