// Misc utilities for the utplot tools.

mod configs;

// A structure representing the run configuration read from a file.

pub use configs::RunConfig;

// Read a run configuration from a json file.

pub use configs::read_run_config;

// Decode a run configuration from an already-parsed json value.

pub use configs::run_config_from_value;
