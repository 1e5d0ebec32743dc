//! Generated protobuf and gRPC types for the `lockstep.v1` package.

tonic::include_proto!("lockstep.v1");
