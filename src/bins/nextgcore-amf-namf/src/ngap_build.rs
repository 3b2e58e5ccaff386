//! NGAP Message Building
//!
//! Simplified NGAP encodings for the messages the AMF sends on behalf of the
//! SMF. Every message opens with the procedure code (2 octets) and the
//! criticality (1 octet), followed by the AMF/RAN UE NGAP IDs where the
//! message is UE associated. Variable-length fields carry a 2-octet length.

use bytes::{BufMut, Bytes, BytesMut};

use crate::context::{AmfSess, AmfUe, Bitrate, Guami, PlmnId, RanUe, SNssai};

/// NGAP procedure codes
pub mod procedure_code {
    pub const DOWNLINK_NAS_TRANSPORT: u16 = 4;
    pub const INITIAL_CONTEXT_SETUP: u16 = 14;
    pub const PAGING: u16 = 24;
    pub const PDU_SESSION_RESOURCE_MODIFY: u16 = 26;
    pub const PDU_SESSION_RESOURCE_RELEASE: u16 = 28;
    pub const PDU_SESSION_RESOURCE_SETUP: u16 = 29;
    pub const UE_CONTEXT_MODIFICATION: u16 = 40;
}

const CRITICALITY_REJECT: u8 = 0;
const CRITICALITY_IGNORE: u8 = 1;

struct NgapWriter(BytesMut);

impl NgapWriter {
    fn start(procedure_code: u16, criticality: u8) -> Self {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_u16(procedure_code);
        buf.put_u8(criticality);
        Self(buf)
    }

    fn ue_associated(procedure_code: u16, criticality: u8, ran_ue: &RanUe) -> Self {
        let mut w = Self::start(procedure_code, criticality);
        w.0.put_u64(ran_ue.amf_ue_ngap_id);
        w.0.put_u64(ran_ue.ran_ue_ngap_id);
        w
    }

    fn octets(&mut self, data: &[u8]) {
        self.0.put_u16(data.len() as u16);
        self.0.put_slice(data);
    }

    fn optional_octets(&mut self, data: Option<&[u8]>) {
        match data {
            Some(data) => {
                self.0.put_u8(1);
                self.octets(data);
            }
            None => self.0.put_u8(0),
        }
    }

    // BCD, filler digit in mnc3 for 2-digit MNCs
    fn plmn_id(&mut self, plmn_id: &PlmnId) {
        self.0.put_u8((plmn_id.mcc2 << 4) | plmn_id.mcc1);
        self.0.put_u8((plmn_id.mnc3 << 4) | plmn_id.mcc3);
        self.0.put_u8((plmn_id.mnc2 << 4) | plmn_id.mnc1);
    }

    fn s_nssai(&mut self, s_nssai: &SNssai) {
        self.0.put_u8(s_nssai.sst);
        match s_nssai.sd {
            Some(sd) => {
                self.0.put_u8(1);
                self.0.put_slice(&sd.to_be_bytes()[1..]);
            }
            None => self.0.put_u8(0),
        }
    }

    fn ambr(&mut self, ambr: &Bitrate) {
        self.0.put_u64(ambr.downlink);
        self.0.put_u64(ambr.uplink);
    }

    /// PSI, slice, optional NAS PDU, N2 SM transfer
    fn setup_item(&mut self, sess: &AmfSess, nas_pdu: Option<&[u8]>, n2_sm_info: &[u8]) {
        self.0.put_u8(sess.psi);
        self.s_nssai(&sess.s_nssai);
        self.optional_octets(nas_pdu);
        self.octets(n2_sm_info);
    }

    fn finish(self) -> Bytes {
        self.0.freeze()
    }
}

pub fn build_downlink_nas_transport(ran_ue: &RanUe, nas_pdu: &[u8]) -> Bytes {
    let mut w = NgapWriter::ue_associated(procedure_code::DOWNLINK_NAS_TRANSPORT, CRITICALITY_IGNORE, ran_ue);
    w.octets(nas_pdu);
    w.finish()
}

/// Initial Context Setup Request carrying a single PDU session setup item
pub fn build_initial_context_setup_request(
    ran_ue: &RanUe,
    amf_ue: &AmfUe,
    guami: &Guami,
    sess: &AmfSess,
    nas_pdu: Option<&[u8]>,
    n2_sm_info: &[u8],
) -> Bytes {
    let mut w = NgapWriter::ue_associated(procedure_code::INITIAL_CONTEXT_SETUP, CRITICALITY_REJECT, ran_ue);

    w.plmn_id(&guami.plmn_id);
    w.0.put_u8(guami.amf_id.region);
    w.0.put_u16(guami.amf_id.set);
    w.0.put_u8(guami.amf_id.pointer);

    w.ambr(&amf_ue.ue_ambr);

    w.0.put_u8(amf_ue.allowed_nssai.len() as u8);
    for slice in &amf_ue.allowed_nssai {
        w.s_nssai(&slice.s_nssai);
    }

    let capability = amf_ue.ue_security_capability.as_bytes();
    w.0.put_u8(capability.len() as u8);
    w.0.put_slice(capability);

    w.0.put_u8(1);
    w.setup_item(sess, nas_pdu, n2_sm_info);
    w.finish()
}

pub fn build_pdu_session_resource_setup_request(
    ran_ue: &RanUe,
    sess: &AmfSess,
    nas_pdu: Option<&[u8]>,
    n2_sm_info: &[u8],
) -> Bytes {
    let mut w =
        NgapWriter::ue_associated(procedure_code::PDU_SESSION_RESOURCE_SETUP, CRITICALITY_REJECT, ran_ue);
    w.setup_item(sess, nas_pdu, n2_sm_info);
    w.finish()
}

/// Modify always carries the 5GSM command
pub fn build_pdu_session_resource_modify_request(
    ran_ue: &RanUe,
    sess: &AmfSess,
    nas_pdu: &[u8],
    n2_sm_info: &[u8],
) -> Bytes {
    let mut w =
        NgapWriter::ue_associated(procedure_code::PDU_SESSION_RESOURCE_MODIFY, CRITICALITY_REJECT, ran_ue);
    w.0.put_u8(sess.psi);
    w.octets(nas_pdu);
    w.octets(n2_sm_info);
    w.finish()
}

pub fn build_pdu_session_resource_release_command(
    ran_ue: &RanUe,
    sess: &AmfSess,
    nas_pdu: Option<&[u8]>,
    n2_sm_info: &[u8],
) -> Bytes {
    let mut w =
        NgapWriter::ue_associated(procedure_code::PDU_SESSION_RESOURCE_RELEASE, CRITICALITY_REJECT, ran_ue);
    w.0.put_u8(sess.psi);
    w.optional_octets(nas_pdu);
    w.octets(n2_sm_info);
    w.finish()
}

/// Paging by 5G-S-TMSI in the UE's last known TAI
///
/// `None` when the UE has no 5G-GUTI.
pub fn build_paging(amf_ue: &AmfUe) -> Option<Bytes> {
    let guti = amf_ue.current_guti.as_ref()?;

    let mut w = NgapWriter::start(procedure_code::PAGING, CRITICALITY_IGNORE);
    w.0.put_u16(guti.amf_id.set);
    w.0.put_u8(guti.amf_id.pointer);
    w.0.put_u32(guti.tmsi);

    w.plmn_id(&amf_ue.nr_tai.plmn_id);
    w.0.put_slice(&amf_ue.nr_tai.tac.to_be_bytes()[1..]);

    Some(w.finish())
}

/// UE Context Modification Request with the current AMBR and RAT restrictions
pub fn build_ue_context_modification_request(ran_ue: &RanUe, amf_ue: &AmfUe) -> Bytes {
    let mut w = NgapWriter::ue_associated(procedure_code::UE_CONTEXT_MODIFICATION, CRITICALITY_REJECT, ran_ue);

    if amf_ue.ue_ambr.downlink > 0 || amf_ue.ue_ambr.uplink > 0 {
        w.0.put_u8(1);
        w.ambr(&amf_ue.ue_ambr);
    } else {
        w.0.put_u8(0);
    }

    w.0.put_u8(amf_ue.rat_restrictions.len() as u8);
    for rat in &amf_ue.rat_restrictions {
        w.octets(rat.as_str().as_bytes());
    }

    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AmfId, Guti5gs, RatType, Tai5gs};

    fn procedure(msg: &[u8]) -> u16 {
        u16::from_be_bytes([msg[0], msg[1]])
    }

    fn ran_ue() -> RanUe {
        RanUe::new(1, 1, 1001, 2001)
    }

    fn sess() -> AmfSess {
        let mut sess = AmfSess::new(1, 1, 5);
        sess.s_nssai = SNssai { sst: 1, sd: Some(0x010203) };
        sess
    }

    #[test]
    fn test_ue_associated_header() {
        let msg = build_downlink_nas_transport(&ran_ue(), &[0x7e, 0x00, 0x68]);
        assert_eq!(procedure(&msg), procedure_code::DOWNLINK_NAS_TRANSPORT);
        assert_eq!(msg[2], CRITICALITY_IGNORE);
        assert_eq!(&msg[3..11], &2001u64.to_be_bytes());
        assert_eq!(&msg[11..19], &1001u64.to_be_bytes());
        assert_eq!(&msg[19..], &[0x00, 0x03, 0x7e, 0x00, 0x68]);
    }

    #[test]
    fn test_initial_context_setup_ends_with_session_item() {
        let mut amf_ue = AmfUe::new(1);
        amf_ue.ue_ambr = Bitrate { downlink: 2_000_000, uplink: 1_000_000 };
        let guami = Guami {
            plmn_id: PlmnId::new("001", "01"),
            amf_id: AmfId { region: 2, set: 1, pointer: 0 },
        };
        let msg = build_initial_context_setup_request(&ran_ue(), &amf_ue, &guami, &sess(), Some(&[0x7e]), &[0xaa, 0xbb]);
        assert_eq!(procedure(&msg), procedure_code::INITIAL_CONTEXT_SETUP);
        // psi, sst, sd, nas present, nas, n2
        let tail = [5, 1, 1, 0x01, 0x02, 0x03, 1, 0x00, 0x01, 0x7e, 0x00, 0x02, 0xaa, 0xbb];
        assert!(msg.ends_with(&tail));
    }

    #[test]
    fn test_setup_without_nas_pdu() {
        let msg = build_pdu_session_resource_setup_request(&ran_ue(), &sess(), None, &[0x01, 0x02, 0x03]);
        assert_eq!(procedure(&msg), procedure_code::PDU_SESSION_RESOURCE_SETUP);
        assert_eq!(&msg[19..], &[5, 1, 1, 0x01, 0x02, 0x03, 0, 0x00, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_modify_and_release_codes() {
        let msg = build_pdu_session_resource_modify_request(&ran_ue(), &sess(), &[0x01], &[0x02]);
        assert_eq!(procedure(&msg), procedure_code::PDU_SESSION_RESOURCE_MODIFY);

        let msg = build_pdu_session_resource_release_command(&ran_ue(), &sess(), None, &[0x02]);
        assert_eq!(procedure(&msg), procedure_code::PDU_SESSION_RESOURCE_RELEASE);
        assert_eq!(&msg[19..], &[5, 0, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_paging_needs_guti() {
        let mut amf_ue = AmfUe::new(1);
        assert!(build_paging(&amf_ue).is_none());

        amf_ue.current_guti = Some(Guti5gs {
            plmn_id: PlmnId::new("001", "01"),
            amf_id: AmfId { region: 2, set: 1, pointer: 1 },
            tmsi: 0x12345678,
        });
        amf_ue.nr_tai = Tai5gs { plmn_id: PlmnId::new("001", "01"), tac: 1 };

        let msg = build_paging(&amf_ue).unwrap();
        assert_eq!(procedure(&msg), procedure_code::PAGING);
        assert_eq!(&msg[6..10], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(&msg[msg.len() - 3..], &[0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_ue_context_modification_lists_restrictions() {
        let mut amf_ue = AmfUe::new(1);
        amf_ue.rat_restrictions = vec![RatType::Eutra];
        let msg = build_ue_context_modification_request(&ran_ue(), &amf_ue);
        assert_eq!(procedure(&msg), procedure_code::UE_CONTEXT_MODIFICATION);
        assert_eq!(msg[19], 0);
        assert!(msg.ends_with(b"EUTRA"));
    }
}
