//! Domain core for the layer-split engine.
//!
//! Pure types and functions with zero internal dependencies so they can be
//! shared by the pipeline, the worker and the HTTP collaborator clients:
//!
//! - [`geometry`]: normalized/absolute box conversion and overlap tests.
//! - [`placement`]: collision-avoiding anchor selection for a batch of
//!   new canvas elements.
//! - [`job`]: the Job entity, its state machine and progress tuple.
//! - [`canvas`]: canvas document, element and file types.
//! - [`descriptor`]: image descriptors submitted with a Job.
//! - [`providers`]: contracts of the external collaborators.

pub mod canvas;
pub mod descriptor;
pub mod error;
pub mod geometry;
pub mod job;
pub mod job_events;
pub mod layers;
pub mod placement;
pub mod providers;
pub mod types;
