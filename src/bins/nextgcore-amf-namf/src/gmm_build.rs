//! GMM Message Building
//!
//! 5GMM messages the Namf procedures send towards the UE: the DL NAS
//! transport carrying 5GSM payloads and the network-initiated
//! deregistration request.

use bytes::{BufMut, Bytes, BytesMut};

use crate::context::{AccessType, AmfUe};

const EPD_5GMM: u8 = 0x7e;

const SECURITY_HEADER_PLAIN: u8 = 0x00;
const SECURITY_HEADER_INTEGRITY_CIPHERED: u8 = 0x02;

const MSG_DEREGISTRATION_REQUEST_TO_UE: u8 = 0x47;
const MSG_DL_NAS_TRANSPORT: u8 = 0x68;

const IEI_PDU_SESSION_ID: u8 = 0x12;
const IEI_BACK_OFF_TIMER: u8 = 0x37;
const IEI_GMM_CAUSE: u8 = 0x58;

/// Payload container types carried in DL NAS transport
pub mod payload_container_type {
    pub const N1_SM_INFORMATION: u8 = 0x01;
}

/// 5GMM cause values the AMF puts on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GmmCause {
    FiveGsServicesNotAllowed = 7,
    ImplicitlyDeregistered = 10,
    Congestion = 22,
    PayloadWasNotForwarded = 90,
    ProtocolErrorUnspecified = 111,
}

impl From<u8> for GmmCause {
    fn from(value: u8) -> Self {
        match value {
            7 => GmmCause::FiveGsServicesNotAllowed,
            10 => GmmCause::ImplicitlyDeregistered,
            22 => GmmCause::Congestion,
            90 => GmmCause::PayloadWasNotForwarded,
            _ => GmmCause::ProtocolErrorUnspecified,
        }
    }
}

/// Protected 5GMM message: outer security header followed by the plain header
fn start_gmm_message(message_type: u8) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_u8(EPD_5GMM);
    buf.put_u8(SECURITY_HEADER_INTEGRITY_CIPHERED);
    buf.put_u8(EPD_5GMM);
    buf.put_u8(SECURITY_HEADER_PLAIN);
    buf.put_u8(message_type);
    buf
}

fn put_gmm_cause(buf: &mut BytesMut, cause: Option<GmmCause>) {
    if let Some(cause) = cause {
        buf.put_u8(IEI_GMM_CAUSE);
        buf.put_u8(cause as u8);
    }
}

/// Build DL NAS Transport message
pub fn build_dl_nas_transport(
    psi: u8,
    container_type: u8,
    payload_container: &[u8],
    gmm_cause: Option<GmmCause>,
    backoff_time: Option<u8>,
) -> Bytes {
    let mut buf = start_gmm_message(MSG_DL_NAS_TRANSPORT);

    // Upper nibble spare
    buf.put_u8(container_type & 0x0f);
    buf.put_u16(payload_container.len() as u16);
    buf.put_slice(payload_container);

    buf.put_u8(IEI_PDU_SESSION_ID);
    buf.put_u8(psi);

    put_gmm_cause(&mut buf, gmm_cause);

    // GPRS timer 3, 2 second units
    if let Some(time) = backoff_time.filter(|t| *t >= 2) {
        buf.put_u8(IEI_BACK_OFF_TIMER);
        buf.put_u8(1);
        buf.put_u8(time / 2);
    }

    buf.freeze()
}

/// Build Deregistration Request (network-initiated)
pub fn build_deregistration_request(
    amf_ue: &AmfUe,
    re_registration_required: bool,
    gmm_cause: Option<GmmCause>,
) -> Bytes {
    let mut buf = start_gmm_message(MSG_DEREGISTRATION_REQUEST_TO_UE);

    let mut dereg_type = match amf_ue.access_type {
        AccessType::ThreeGppAccess => 0x01,
        AccessType::NonThreeGppAccess => 0x02,
    };
    if re_registration_required {
        dereg_type |= 0x04;
    }
    buf.put_u8(dereg_type);

    put_gmm_cause(&mut buf, gmm_cause);

    buf.freeze()
}
