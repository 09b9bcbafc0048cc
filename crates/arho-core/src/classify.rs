//! Plan object and regulation-group classification.
//!
//! The wire format carries no kind marker, so kinds are re-derived from
//! the object's geometry class, the plan-type ancestry, and the attached
//! regulations every time a wire document is read. Classification is pure
//! and deterministic.

use arho_db::models::{GroupKind, ObjectKind};

/// Additional-information type value marking a primary land use.
pub const PRIMARY_USE_INFO: &str = "paakayttotarkoitus";

/// Regulation type values whose carrier must reference the land-use area
/// containing it (national quality rule on regulation references).
pub const CONTAINMENT_REGULATIONS: [&str; 7] = [
    "korttelialueTaiKorttelialueenOsa",
    "ohjeellinenrakennusPaikka",
    "rakennusala",
    "rakennusalaJolleSaaSijoittaaSaunan",
    "rakennusalaJolleSaaSijoittaaTalousrakennuksen",
    "rakennuspaikka",
    "sitovanTonttijaonMukainenTontti",
];

/// Regulation type values that make a point object a land-use point.
/// Sorted for binary search.
const LAND_USE_POINT_REGULATIONS: [&str; 63] = [
    "ampumarataAlue",
    "asuinkerrostaloalue",
    "asuinpientaloalue",
    "asumisenAlue",
    "asuntovaunualue",
    "energiahuollonAlue",
    "erityisalue",
    "hautausmaa",
    "henkiloliikenteenTerminaalialue",
    "huoltoasemaAlue",
    "jatteenkasittelyalue",
    "kaivosalue",
    "keskustatoimintojenAlakeskus",
    "keskustatoimintojenAlue",
    "kiertotaloudenAlue",
    "kotielaintaloudenSuuryksikonAlue",
    "kylaAlue",
    "lahivirkistysalue",
    "leirintaAlue",
    "lentoliikenteenAlue",
    "liikennealue",
    "luonnonsuojelualue",
    "maaAinestenOttoalue",
    "maaJaMetsatalousAlue",
    "maaJaMetsatalousalueJollaErityisiaYmparistoarvoja",
    "maaJaMetsatalousalueJollaErityistaUlkoilunOhjaamistarvetta",
    "maaliikenteenAlue",
    "maatalousalue",
    "maisemallisestiArvokasAlue",
    "matkailupalvelujenAlue",
    "metsatalousalue",
    "moottoriurheilualue",
    "muinaismuistoAlue",
    "palstaviljelyalue",
    "palvelujenAlue",
    "pelto",
    "puolustusvoimienAlue",
    "raideliikenteenAlue",
    "rakennusperinnonSuojelemisestaAnnetunLainNojallaSuojeltuRakennus",
    "rakennussuojelualue",
    "retkeilyJaUlkoiluAlue",
    "satama-alue",
    "siirtolapuutarhaAlue",
    "suojaviheralue",
    "suojelualue",
    "taajamatoimintojenAlue",
    "tavaraliikenteenTerminaalialue",
    "teollisuusalue",
    "turvetuotantoalue",
    "tyopaikkojenAlue",
    "uimaranta",
    "urheiluJaVirkistyspalvelujenAlue",
    "vahittaiskaupanMyymalakeskittyma",
    "vahittaiskaupanSuuryksikko",
    "vapaaAjanAsumisenAlue",
    "vapaaAjanAsumisenJaMatkailunAlue",
    "varastoalue",
    "varikko",
    "venesatama",
    "venevalkama",
    "vesialue",
    "virkistysalue",
    "yhdyskuntateknisenHuollonAlue",
];

/// Whether a regulation type value marks land use for point objects.
pub fn is_land_use_point_regulation(value: &str) -> bool {
    LAND_USE_POINT_REGULATIONS.binary_search(&value).is_ok()
}

/// Whether a regulation type value requires a containing land-use area
/// reference on its carrier.
pub fn needs_containing_area(value: &str) -> bool {
    CONTAINMENT_REGULATIONS.contains(&value)
}

/// Classify an area object from the additional-information type values of
/// its attached regulations: a primary-use marker anywhere makes it a
/// land-use area.
pub fn classify_area<'a>(info_type_values: impl IntoIterator<Item = &'a str>) -> ObjectKind {
    if info_type_values.into_iter().any(|v| v == PRIMARY_USE_INFO) {
        ObjectKind::LandUseArea
    } else {
        ObjectKind::OtherArea
    }
}

/// Classify a point object. Local detailed plans (plan-type ancestry root
/// "3") never have land-use points; otherwise the attached regulation
/// types decide.
pub fn classify_point<'a>(
    plan_type_root: &str,
    regulation_type_values: impl IntoIterator<Item = &'a str>,
) -> ObjectKind {
    if plan_type_root == "3" {
        return ObjectKind::OtherPoint;
    }
    if regulation_type_values
        .into_iter()
        .any(is_land_use_point_regulation)
    {
        ObjectKind::LandUsePoint
    } else {
        ObjectKind::OtherPoint
    }
}

/// Derive a group's kind from the kinds of the objects it attaches to.
///
/// The object kind with the most attachments wins; ties resolve in the
/// priority order land-use area, other area, line, land-use point, other
/// point. Zero attachments make a general group.
pub fn classify_group(attached: impl IntoIterator<Item = ObjectKind>) -> GroupKind {
    const PRIORITY: [ObjectKind; 5] = [
        ObjectKind::LandUseArea,
        ObjectKind::OtherArea,
        ObjectKind::Line,
        ObjectKind::LandUsePoint,
        ObjectKind::OtherPoint,
    ];

    let mut counts = [0usize; 5];
    for kind in attached {
        let slot = PRIORITY
            .iter()
            .position(|p| *p == kind)
            .unwrap_or(PRIORITY.len() - 1);
        counts[slot] += 1;
    }

    let mut winner = None;
    let mut best = 0usize;
    for (slot, count) in counts.iter().enumerate() {
        if *count > best {
            best = *count;
            winner = Some(PRIORITY[slot]);
        }
    }

    match winner {
        None => GroupKind::GeneralRegulations,
        Some(ObjectKind::LandUseArea) => GroupKind::LandUseRegulations,
        Some(ObjectKind::OtherArea) => GroupKind::OtherAreaRegulations,
        Some(ObjectKind::Line) => GroupKind::LineRegulations,
        Some(ObjectKind::LandUsePoint) | Some(ObjectKind::OtherPoint) => {
            GroupKind::OtherPointRegulations
        }
    }
}
