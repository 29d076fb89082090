//! Transport protocol policies

use serde::{Deserialize, Serialize};
use stubgen_schema::{Channel, GrpcCode, RepresentationContext, ResponseContract};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Grpc,
    Http,
}

/// Status attached to an encoded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Http(u16),
    Grpc(GrpcCode),
}

impl Protocol {
    pub fn wire_context(&self, namespace: &str) -> RepresentationContext {
        match self {
            Protocol::Grpc => RepresentationContext::grpc_wire(namespace),
            Protocol::Http => RepresentationContext::http_body(namespace),
        }
    }

    /// Protobuf messages cannot be bare scalars or collections.
    pub fn wraps_non_objects(&self) -> bool {
        matches!(self, Protocol::Grpc)
    }

    /// Channel carrying credentials and the view identifier.
    pub fn header_channel(&self) -> Channel {
        match self {
            Protocol::Grpc => Channel::Metadata,
            Protocol::Http => Channel::Header,
        }
    }

    pub fn wire_suffixes(&self) -> (&'static str, &'static str) {
        match self {
            Protocol::Grpc => ("Request", "Response"),
            Protocol::Http => ("RequestBody", "ResponseBody"),
        }
    }

    pub fn status(&self, contract: &ResponseContract) -> Status {
        match self {
            Protocol::Http => Status::Http(contract.http_status.unwrap_or(400)),
            Protocol::Grpc => Status::Grpc(contract.grpc_code.unwrap_or(GrpcCode::Unknown)),
        }
    }

    pub fn unclassified_status(&self) -> Status {
        match self {
            Protocol::Http => Status::Http(500),
            Protocol::Grpc => Status::Grpc(GrpcCode::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_defaults() {
        let contract = ResponseContract::default();
        assert_eq!(Protocol::Http.status(&contract), Status::Http(400));
        assert_eq!(
            Protocol::Grpc.status(&contract),
            Status::Grpc(GrpcCode::Unknown)
        );

        let declared = ResponseContract {
            http_status: Some(404),
            grpc_code: Some(GrpcCode::NotFound),
        };
        assert_eq!(Protocol::Http.status(&declared), Status::Http(404));
        assert_eq!(
            Protocol::Grpc.status(&declared),
            Status::Grpc(GrpcCode::NotFound)
        );
    }
}
