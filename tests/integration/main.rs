//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters or in-memory serial links. All tests run on the
//! host with no serial hardware or kernel MCTP support required.

mod bus_owner_tests;
mod controller_tests;
mod discovery_tests;
mod io_task_tests;
mod mock_link;
mod pldm_flow_tests;
