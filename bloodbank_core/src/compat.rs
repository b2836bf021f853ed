//! ABO/Rh donor compatibility.

use crate::BloodType;

/// Donor types that may supply a recipient of the given type, in table order.
pub fn compatible_donor_types(recipient: BloodType) -> &'static [BloodType] {
    use BloodType::*;

    match recipient {
        APos => &[APos, ANeg, OPos, ONeg],
        ANeg => &[ANeg, ONeg],
        BPos => &[BPos, BNeg, OPos, ONeg],
        BNeg => &[BNeg, ONeg],
        AbPos => &[APos, ANeg, BPos, BNeg, AbPos, AbNeg, OPos, ONeg],
        AbNeg => &[ANeg, BNeg, AbNeg, ONeg],
        OPos => &[OPos, ONeg],
        ONeg => &[ONeg],
    }
}

/// Same lookup for a possibly untyped recipient.
///
/// An untyped recipient can only be matched against itself, and untyped
/// donors are never proposed, so the result is empty.
pub fn compatible_donor_types_for(recipient: Option<BloodType>) -> &'static [BloodType] {
    match recipient {
        Some(t) => compatible_donor_types(t),
        None => &[],
    }
}

pub fn can_donate_to(donor: BloodType, recipient: BloodType) -> bool {
    compatible_donor_types(recipient).contains(&donor)
}
