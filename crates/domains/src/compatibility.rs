//! Red-cell donation compatibility.
//!
//! Each donor type maps to the closed set of recipient types it may donate
//! to. The table is a bitmask per donor type, so lookups are a shift and a mask.

use crate::models::BloodType;
use crate::models::BloodType::*;

const fn mask(recipients: &[BloodType]) -> u8 {
    let mut bits = 0u8;
    let mut i = 0;
    while i < recipients.len() {
        bits |= 1 << (recipients[i] as u8);
        i += 1;
    }
    bits
}

/// Indexed by donor type, in `BloodType::ALL` order.
const CAN_DONATE_TO: [u8; 8] = [
    /* O-  */ mask(&[ONeg, OPos, ANeg, APos, BNeg, BPos, AbNeg, AbPos]),
    /* O+  */ mask(&[OPos, APos, BPos, AbPos]),
    /* A-  */ mask(&[ANeg, APos, AbNeg, AbPos]),
    /* A+  */ mask(&[APos, AbPos]),
    /* B-  */ mask(&[BNeg, BPos, AbNeg, AbPos]),
    /* B+  */ mask(&[BPos, AbPos]),
    /* AB- */ mask(&[AbNeg, AbPos]),
    /* AB+ */ mask(&[AbPos]),
];

/// Whether blood from `donor` may be given to a `recipient`.
pub fn can_donate(donor: BloodType, recipient: BloodType) -> bool {
    CAN_DONATE_TO[donor.index()] & (1 << recipient.index()) != 0
}

/// All recipient types `donor` can serve.
pub fn recipients_of(donor: BloodType) -> impl Iterator<Item = BloodType> {
    BloodType::ALL.into_iter().filter(move |r| can_donate(donor, *r))
}

/// All donor types able to serve `recipient`.
pub fn donors_for(recipient: BloodType) -> impl Iterator<Item = BloodType> {
    BloodType::ALL.into_iter().filter(move |d| can_donate(*d, recipient))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn o_negative_is_universal_donor() {
        assert_eq!(recipients_of(ONeg).count(), 8);
    }

    #[test]
    fn ab_positive_only_serves_itself() {
        assert_eq!(recipients_of(AbPos).collect::<Vec<_>>(), vec![AbPos]);
    }

    #[test]
    fn ab_positive_is_universal_recipient() {
        assert_eq!(donors_for(AbPos).count(), 8);
    }

    #[test]
    fn o_negative_recipient_needs_o_negative() {
        assert_eq!(donors_for(ONeg).collect::<Vec<_>>(), vec![ONeg]);
    }

    #[test]
    fn every_type_can_serve_itself() {
        for t in BloodType::ALL {
            assert!(can_donate(t, t), "{t} should donate to itself");
        }
    }

    #[test]
    fn rh_positive_never_serves_rh_negative() {
        for d in [OPos, APos, BPos, AbPos] {
            for r in [ONeg, ANeg, BNeg, AbNeg] {
                assert!(!can_donate(d, r), "{d} must not donate to {r}");
            }
        }
    }

    #[test]
    fn spot_checks() {
        assert!(can_donate(ANeg, AbPos));
        assert!(can_donate(BPos, AbPos));
        assert!(!can_donate(APos, BPos));
        assert!(!can_donate(BNeg, ANeg));
        assert!(can_donate(OPos, APos));
        assert!(!can_donate(OPos, ONeg));
    }
}
