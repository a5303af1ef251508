//! gRPC transport (SPEC_FULL.md §4.J): frames the Certify RPC over `tonic`
//! and maps `identity_core::IssuanceError` onto `tonic::Status` one-to-one,
//! per spec.md §7. This is the only place status codes are named;
//! `identity-core` itself never depends on `tonic`. Each call runs inside its
//! own tracing span, the span-per-request idiom SPEC_FULL.md §4.L asks for.

use std::time::UNIX_EPOCH;

use identity_core::IssuanceError;
use identity_core::IssuanceRequest;
use identity_core::IssuanceService;
use identity_proto::CertifyRequest;
use identity_proto::CertifyResponse;
use identity_proto::identity_service_server::IdentityService;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use tonic::Request;
use tonic::Response;
use tonic::Status;

use crate::admin::IssuanceOutcomeLabels;

pub struct GrpcIdentityService {
	service: IssuanceService,
	issuance_metrics: Family<IssuanceOutcomeLabels, Counter>,
}

impl GrpcIdentityService {
	pub fn new(service: IssuanceService, issuance_metrics: Family<IssuanceOutcomeLabels, Counter>) -> Self {
		Self { service, issuance_metrics }
	}
}

impl IdentityService for GrpcIdentityService {
	#[tracing::instrument(skip_all, fields(identity = %request.get_ref().identity))]
	async fn certify(&self, request: Request<CertifyRequest>) -> Result<Response<CertifyResponse>, Status> {
		let request = request.into_inner();
		let result = self
			.service
			.certify(IssuanceRequest {
				identity: request.identity,
				token: request.token,
				csr: request.csr,
			})
			.await;

		self
			.issuance_metrics
			.get_or_create(&IssuanceOutcomeLabels { outcome: outcome_label(&result) })
			.inc();

		if let Err(err) = &result {
			tracing::warn!(error = %err, "certify request denied");
		}
		let response = result.map_err(map_status)?;

		let valid_until_unix_secs = response
			.valid_until
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_secs() as i64;

		Ok(Response::new(CertifyResponse {
			leaf_certificate: response.leaf.as_ref().to_vec(),
			intermediate_certificates: response.intermediate_chain.iter().map(|c| c.as_ref().to_vec()).collect(),
			valid_until_unix_secs,
		}))
	}
}

/// Label for the `identity_issuance_total` counter (SPEC_FULL.md §4.M).
fn outcome_label<T>(result: &Result<T, IssuanceError>) -> &'static str {
	match result {
		Ok(_) => "ok",
		Err(IssuanceError::Unavailable) => "unavailable",
		Err(IssuanceError::InvalidArgument(_)) => "invalid_argument",
		Err(IssuanceError::FailedPrecondition(_)) => "failed_precondition",
		Err(IssuanceError::Internal(_)) => "internal",
	}
}

/// spec.md §7's client-facing taxonomy, mapped 1:1 onto gRPC status codes.
fn map_status(err: IssuanceError) -> Status {
	match err {
		IssuanceError::Unavailable => Status::unavailable(err.to_string()),
		IssuanceError::InvalidArgument(_) => Status::invalid_argument(err.to_string()),
		IssuanceError::FailedPrecondition(_) => Status::failed_precondition(err.to_string()),
		IssuanceError::Internal(_) => Status::internal(err.to_string()),
	}
}
