//! Draft quality heuristics.

/// Length-bucketed template adherence score for a draft.
///
/// A proxy for how closely the draft tracks the response template; the
/// optimal band is 200-500 characters.
pub fn template_adherence_score(draft_length: usize) -> f64 {
    if draft_length < 100 {
        0.20
    } else if draft_length < 200 {
        0.50
    } else if draft_length <= 500 {
        1.00
    } else if draft_length <= 800 {
        0.80
    } else {
        0.60
    }
}

/// Composite quality score from human feedback, clamped to [0, 1].
///
/// Approval contributes up to 0.60 weighted by how much the reviewer had to
/// edit; an optional 1-5 rating contributes up to 0.40. A bare "rated"
/// action carries the rating at full weight instead.
pub fn quality_score(action: &str, rating: Option<u8>, edit_distance: usize) -> f64 {
    if action == "rated"
        && let Some(r) = rating
    {
        return (f64::from(r) / 5.0).clamp(0.0, 1.0);
    }

    let mut score: f64 = 0.0;

    if action == "approved" {
        score += if edit_distance == 0 {
            0.60
        } else if edit_distance < 50 {
            0.45
        } else if edit_distance < 200 {
            0.30
        } else {
            0.0
        };
    }

    if let Some(r) = rating {
        score += (f64::from(r) / 5.0) * 0.40;
    }

    score.clamp(0.0, 1.0)
}

/// Bucket an edit distance into a reviewer-facing edit type.
pub fn edit_type(edit_distance: usize) -> Option<&'static str> {
    if edit_distance == 0 {
        None
    } else if edit_distance < 50 {
        Some("minor")
    } else if edit_distance < 200 {
        Some("major")
    } else {
        Some("complete_rewrite")
    }
}
