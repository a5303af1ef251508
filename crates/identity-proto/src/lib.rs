//! Generated client/server code for the `mesh.identity.v1.IdentityService` RPC.

pub mod mesh {
	pub mod identity {
		pub mod v1 {
			tonic::include_proto!("mesh.identity.v1");
		}
	}
}

pub use mesh::identity::v1::*;
