// Domain layer: catalog model and the ports (interfaces) the jobs are written against.

pub mod model;
pub mod ports;
