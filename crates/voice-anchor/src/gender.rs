pub const MALE: &str = "male";
pub const FEMALE: &str = "female";

/// Lower-cases a caller supplied gender and folds the short forms.
///
/// `"m"`/`"male"` become `"male"`, `"f"`/`"female"` become `"female"`; any
/// other value is returned lower-cased and will only ever match a profile
/// carrying that exact string.
pub fn normalize_gender(raw: &str) -> String {
    let folded = raw.trim().to_lowercase();
    match folded.as_str() {
        "m" | MALE => MALE.to_string(),
        "f" | FEMALE => FEMALE.to_string(),
        _ => folded,
    }
}

/// Guesses a gender from a profile id such as `dm_female_02`.
///
/// `"female"` contains `"male"`, so the male branch only applies when the
/// id does not also mention `"female"`.
pub fn infer_gender_from_id(profile_id: &str) -> Option<&'static str> {
    if profile_id.contains(MALE) && !profile_id.contains(FEMALE) {
        Some(MALE)
    } else if profile_id.contains(FEMALE) {
        Some(FEMALE)
    } else {
        None
    }
}
