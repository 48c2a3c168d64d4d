use crate::types::Candidate;
use std::cmp::Ordering;

/// ROI above this no longer improves the score
const ROI_CAP_PCT: f64 = 200.0;

/// Calculate the dashboard score for a candidate
///
/// Margin carries 0.6 per point; ROI contributes up to 40 points, capped at
/// 200%. Missing values count as zero.
pub fn calculate_candidate_score(candidate: &Candidate) -> f64 {
    let margin = candidate.margin_pct.unwrap_or(0.0);
    let roi = candidate.roi_pct.unwrap_or(0.0).min(ROI_CAP_PCT);
    (margin * 0.6) + ((roi / ROI_CAP_PCT) * 40.0)
}

/// Score every candidate and assign its 1-based rank by descending score
///
/// The slice keeps its order; ties rank in document order.
pub fn decorate_candidates(candidates: &mut [Candidate]) {
    for candidate in candidates.iter_mut() {
        candidate.score = calculate_candidate_score(candidate);
    }

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .score
            .partial_cmp(&candidates[a].score)
            .unwrap_or(Ordering::Equal)
    });

    for (position, idx) in order.into_iter().enumerate() {
        candidates[idx].rank = position + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, margin: Option<f64>, roi: Option<f64>) -> Candidate {
        Candidate {
            title: title.to_string(),
            margin_pct: margin,
            roi_pct: roi,
            ..Default::default()
        }
    }

    #[test]
    fn test_score_formula() {
        let c = candidate("a", Some(30.0), Some(100.0));
        assert!((calculate_candidate_score(&c) - 38.0).abs() < 1e-9);

        let capped = candidate("b", Some(10.0), Some(500.0));
        assert!((calculate_candidate_score(&capped) - 46.0).abs() < 1e-9);

        let empty = candidate("c", None, None);
        assert_eq!(calculate_candidate_score(&empty), 0.0);
    }

    #[test]
    fn test_rank_keeps_slice_order() {
        let mut candidates = vec![
            candidate("low", Some(5.0), None),
            candidate("high", Some(40.0), Some(150.0)),
            candidate("mid", Some(20.0), Some(50.0)),
        ];
        decorate_candidates(&mut candidates);

        assert_eq!(candidates[0].title, "low");
        assert_eq!(candidates[0].rank, 3);
        assert_eq!(candidates[1].rank, 1);
        assert_eq!(candidates[2].rank, 2);
    }

    #[test]
    fn test_ties_rank_in_document_order() {
        let mut candidates = vec![
            candidate("first", Some(10.0), None),
            candidate("second", Some(10.0), None),
        ];
        decorate_candidates(&mut candidates);
        assert_eq!(candidates[0].rank, 1);
        assert_eq!(candidates[1].rank, 2);

        // decorating again changes nothing
        let before = candidates.clone();
        decorate_candidates(&mut candidates);
        assert_eq!(before, candidates);
    }
}
