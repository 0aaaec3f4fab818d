//! End-to-end tests of the transducer loss against reference values.

mod common;

use approx::assert_abs_diff_eq;
use scirs2_core::ndarray::{Array2, Array3, Axis};
use std::collections::HashMap;
use tensorlogic_transducer::{
    char_tokens, greedy_decode, Ctc, Reduction, Transducer, TransducerConfig, TransducerError,
};
use tensorlogic_wfst::{forward_score, intersect, intersect_traced, ForwardScore, Graph};

use common::{char_index, log_softmax_rows, reference_ctc, wavy_scores};

fn transducer(tokens: &[&str], graphemes: &str, config: TransducerConfig) -> Transducer {
    Transducer::new(&char_tokens(tokens), &char_index(graphemes), config).unwrap()
}

fn log_of(probs: &[f64], frames: usize, classes: usize) -> Array3<f64> {
    Array3::from_shape_vec((1, frames, classes), probs.iter().map(|p| p.ln()).collect()).unwrap()
}

// ============================================================================
// Forward values
// ============================================================================

#[test]
fn test_fwd_trivial() {
    let scores = log_of(&[1.0, 0.0, 0.0, 1.0, 1.0, 0.0], 3, 2);

    // Without blank
    let t = transducer(&["a", "b"], "ab", TransducerConfig::new());
    assert_abs_diff_eq!(t.loss(&scores.view(), &[vec![0, 1, 0]]).unwrap(), 0.0, epsilon = 1e-12);

    // With blank
    let t = transducer(&["a"], "a", TransducerConfig::new().with_blank(true));
    assert_abs_diff_eq!(t.loss(&scores.view(), &[vec![0, 0]]).unwrap(), 0.0, epsilon = 1e-12);

    // With repeats not allowed
    let t = transducer(
        &["a"],
        "a",
        TransducerConfig::new().with_blank(true).with_allow_repeats(false),
    );
    assert_abs_diff_eq!(t.loss(&scores.view(), &[vec![0, 0]]).unwrap(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_fwd_uniform() {
    let scores = Array3::<f64>::zeros((1, 3, 4));
    let t = transducer(&["a", "b", "c"], "abc", TransducerConfig::new().with_blank(true));
    let loss = t.loss(&scores.view(), &[vec![1, 2]]).unwrap();
    assert_abs_diff_eq!(loss, -(0.25f64 * 0.25 * 0.25 * 5.0).ln(), epsilon = 1e-9);
}

// ============================================================================
// CTC reference values
// ============================================================================

#[rustfmt::skip]
const CTC_EMISSIONS_1: [f64; 30] = [
    0.633766,  0.221185, 0.0917319, 0.0129757,  0.0142857,  0.0260553,
    0.111121,  0.588392, 0.278779,  0.0055756,  0.00569609, 0.010436,
    0.0357786, 0.633813, 0.321418,  0.00249248, 0.00272882, 0.0037688,
    0.0663296, 0.643849, 0.280111,  0.00283995, 0.0035545,  0.00331533,
    0.458235,  0.396634, 0.123377,  0.00648837, 0.00903441, 0.00623107,
];

#[rustfmt::skip]
const CTC_GRAD_1: [f64; 30] = [
    -0.366234, 0.221185,  0.0917319, 0.0129757,  0.0142857,  0.0260553,
    0.111121,  -0.411608, 0.278779,  0.0055756,  0.00569609, 0.010436,
    0.0357786, 0.633813,  -0.678582, 0.00249248, 0.00272882, 0.0037688,
    0.0663296, -0.356151, 0.280111,  0.00283995, 0.0035545,  0.00331533,
    -0.541765, 0.396634,  0.123377,  0.00648837, 0.00903441, 0.00623107,
];

#[rustfmt::skip]
const CTC_EMISSIONS_2: [f64; 30] = [
    0.30176,  0.28562,  0.0831517, 0.0862751, 0.0816851, 0.161508,
    0.24082,  0.397533, 0.0557226, 0.0546814, 0.0557528, 0.19549,
    0.230246, 0.450868, 0.0389607, 0.038309,  0.0391602, 0.202456,
    0.280884, 0.429522, 0.0326593, 0.0339046, 0.0326856, 0.190345,
    0.423286, 0.315517, 0.0338439, 0.0393744, 0.0339315, 0.154046,
];

#[rustfmt::skip]
const CTC_GRAD_2: [f64; 30] = [
    -0.69824,  0.28562,   0.0831517, 0.0862751, 0.0816851, 0.161508,
    0.24082,   -0.602467, 0.0557226, 0.0546814, 0.0557528, 0.19549,
    0.230246,  0.450868,  0.0389607, 0.038309,  0.0391602, -0.797544,
    0.280884,  -0.570478, 0.0326593, 0.0339046, 0.0326856, 0.190345,
    -0.576714, 0.315517,  0.0338439, 0.0393744, 0.0339315, 0.154046,
];

fn check_ctc_case(
    emissions: &[f64],
    expected_grad: &[f64],
    target: Vec<usize>,
    allow_repeats: bool,
    expected_loss: f64,
) {
    let config = TransducerConfig::new()
        .with_blank(true)
        .with_allow_repeats(allow_repeats);
    let t = transducer(&["a", "b", "c", "d", "e"], "abcde", config);
    let scores = log_of(emissions, 5, 6);

    let forward = t.forward(&scores.view(), &[target]).unwrap();
    assert_abs_diff_eq!(forward.value(), expected_loss, epsilon = 1e-5);

    let grad = t.backward(&forward, 1.0).unwrap();
    for (got, want) in grad.iter().zip(expected_grad) {
        assert_abs_diff_eq!(*got, *want, epsilon = 1e-5);
    }
}

#[test]
fn test_ctc_with_repeats() {
    check_ctc_case(&CTC_EMISSIONS_1, &CTC_GRAD_1, vec![0, 1, 2, 1, 0], true, 3.34211);
}

#[test]
fn test_ctc_without_repeats() {
    check_ctc_case(&CTC_EMISSIONS_2, &CTC_GRAD_2, vec![0, 1, 1, 0], false, 5.42262);
}

#[test]
fn test_ctc_matches_reference_recursion() {
    let (batch, frames, classes) = (5, 20, 15);
    let blank = classes - 1;
    let targets = vec![
        vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
        vec![1, 1],
        vec![0, 2, 3],
        vec![0, 0, 0, 0, 0],
        vec![0, 4, 8, 12],
    ];
    let scores = wavy_scores(batch, frames, classes, 0.25);

    for reduction in [Reduction::None, Reduction::Mean] {
        let ctc = Ctc::with_reduction(blank, reduction).unwrap();
        let forward = ctc.forward(&scores.view(), &targets).unwrap();
        let grad = ctc.backward(&forward, 1.0).unwrap();

        let mut expected_loss = 0.0;
        for (b, target) in targets.iter().enumerate() {
            let log_probs = log_softmax_rows(&scores.index_axis(Axis(0), b));
            let (loss, expected_grad) = reference_ctc(&log_probs.view(), target, blank);
            let weight = reduction.scale(target.len()) / batch as f64;
            expected_loss += loss * weight;

            let got = grad.index_axis(Axis(0), b);
            for (g, e) in got.iter().zip(expected_grad.iter()) {
                assert_abs_diff_eq!(*g, e * weight, epsilon = 1e-9);
            }
        }
        assert_abs_diff_eq!(forward.value(), expected_loss, epsilon = 1e-9);
    }
}

// ============================================================================
// Lexicon decompositions
// ============================================================================

/// All frame alignments of "aba" over tokens a, b, ab, ba, aba.
fn hand_built_alignments() -> Graph {
    let mut g = Graph::new();
    g.add_node(true, false);

    // a·b·a
    g.add_node(false, false);
    g.add_arc(0, 1, 0);
    g.add_arc(1, 1, 0);
    g.add_node(false, false);
    g.add_arc(1, 2, 1);
    g.add_arc(2, 2, 1);
    g.add_node(false, true);
    g.add_arc(2, 3, 0);
    g.add_arc(3, 3, 0);

    // a·ba
    g.add_node(false, true);
    g.add_arc(1, 4, 3);
    g.add_arc(4, 4, 3);

    // ab·a
    g.add_node(false, false);
    g.add_arc(0, 5, 2);
    g.add_arc(5, 5, 2);
    g.add_arc(5, 3, 0);

    // aba
    g.add_node(false, true);
    g.add_arc(0, 6, 4);
    g.add_arc(6, 6, 4);
    g
}

#[test]
fn test_simple_decomposition() {
    let (frames, classes) = (5, 5);
    let t = transducer(&["a", "b", "ab", "ba", "aba"], "ab", TransducerConfig::new());
    let scores = wavy_scores(1, frames, classes, 1.0);

    let mut emissions = Graph::linear_chain(frames, classes);
    emissions.set_weights(scores.as_slice().unwrap()).unwrap();
    let alignments = hand_built_alignments();
    let expected_loss = forward_score(&emissions).unwrap()
        - forward_score(&intersect(&emissions, &alignments)).unwrap();

    let forward = t.forward(&scores.view(), &[vec![0, 1, 0]]).unwrap();
    assert_abs_diff_eq!(forward.value(), expected_loss, epsilon = 1e-9);

    // d/dx [logZ(x) - numerator(x)]
    let normalizer = ForwardScore::compute(emissions.clone()).unwrap();
    let mut expected_grad = normalizer.arc_gradients(1.0);
    let (lattice, trace) = intersect_traced(&emissions, &alignments);
    let numerator = ForwardScore::compute(lattice).unwrap();
    trace.accumulate_left(&numerator.arc_gradients(-1.0), &mut expected_grad, 1.0);

    let grad = t.backward(&forward, 1.0).unwrap();
    for (got, want) in grad.iter().zip(&expected_grad) {
        assert_abs_diff_eq!(*got, *want, epsilon = 1e-9);
    }
}

// ============================================================================
// Decoding
// ============================================================================

#[rustfmt::skip]
fn viterbi_emissions() -> Array3<f64> {
    let e1 = [
        0.0, 4.0, 0.0, 1.0,
        0.0, 2.0, 1.0, 1.0,
        0.0, 0.0, 0.0, 2.0,
        0.0, 0.0, 0.0, 2.0,
        8.0, 0.0, 0.0, 2.0,
    ];
    let e2 = [
        0.0, 2.0, 1.0, 7.0,
        0.0, 2.0, 9.0, 1.0,
        0.0, 0.0, 0.0, 2.0,
        0.0, 0.0, 5.0, 2.0,
        1.0, 0.0, 0.0, 2.0,
    ];
    Array3::from_shape_vec((2, 5, 4), e1.iter().chain(e2.iter()).copied().collect()).unwrap()
}

#[test]
fn test_viterbi_without_blank() {
    let t = transducer(&["a", "b", "c", "d"], "abcd", TransducerConfig::new());
    let decoded = t.decode(&viterbi_emissions().view()).unwrap();
    assert_eq!(decoded, vec![vec![1, 3, 0], vec![3, 2, 3, 2, 3]]);
}

#[test]
fn test_viterbi_with_blank_without_repeats() {
    let config = TransducerConfig::new()
        .with_blank(true)
        .with_allow_repeats(false);
    let t = transducer(&["a", "b", "c"], "abc", config);
    let emissions = viterbi_emissions();
    let decoded = t.decode(&emissions.view()).unwrap();
    assert_eq!(decoded, vec![vec![1, 0], vec![2, 2]]);

    // Greedy decoding agrees when the framewise argmax is a valid path.
    for (b, expected) in decoded.iter().enumerate() {
        assert_eq!(&greedy_decode(&emissions.index_axis(Axis(0), b), Some(3)), expected);
    }
}

#[test]
fn test_decode_merges_unseparated_run() {
    // Without a blank frame in between, two frames of "a" are one token.
    let config = TransducerConfig::new()
        .with_blank(true)
        .with_allow_repeats(false);
    let t = transducer(&["a", "b"], "ab", config);
    let scores = Array3::from_shape_vec(
        (1, 2, 3),
        vec![0.0, -3.0, -1.0, 0.0, -3.0, -1.0],
    )
    .unwrap();
    assert_eq!(t.decode(&scores.view()).unwrap(), vec![vec![0]]);
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn test_construction_failures() {
    let tokens = char_tokens(&["a", "b"]);
    let missing = Transducer::new(&tokens, &char_index("a"), TransducerConfig::new());
    assert!(matches!(missing, Err(TransducerError::KeyMissing { .. })));

    let repeats = Transducer::new(
        &tokens,
        &char_index("ab"),
        TransducerConfig::new().with_allow_repeats(false),
    );
    assert!(matches!(repeats, Err(TransducerError::ConfigError(_))));

    let n_gram = Transducer::new(&tokens, &char_index("ab"), TransducerConfig::new().with_n_gram(1));
    assert!(matches!(n_gram, Err(TransducerError::ConfigError(_))));
}

#[test]
fn test_generic_graphemes() {
    // Graphemes can be any hashable type, here word pieces.
    let tokens = vec![vec!["th"], vec!["e"], vec!["th", "e"]];
    let index: HashMap<&str, usize> = [("th", 0), ("e", 1)].into_iter().collect();
    let t = Transducer::new(&tokens, &index, TransducerConfig::new()).unwrap();
    assert_eq!(t.num_classes(), 3);

    // Over a single frame only the whole-word token fits.
    let scores = Array3::<f64>::zeros((1, 1, 3));
    let loss = t.loss(&scores.view(), &[vec![0, 1]]).unwrap();
    assert_abs_diff_eq!(loss, 3f64.ln(), epsilon = 1e-12);
}

#[test]
fn test_infinite_loss_is_not_an_error() {
    let t = transducer(&["a", "b"], "ab", TransducerConfig::new());
    // One frame cannot emit two tokens.
    let scores = Array3::<f64>::zeros((2, 1, 2));
    let forward = t.forward(&scores.view(), &[vec![0, 1], vec![1]]).unwrap();
    let losses = forward.per_example();
    assert_eq!(losses[0], f64::INFINITY);
    assert_abs_diff_eq!(losses[1], 2f64.ln(), epsilon = 1e-12);

    let grad = t.backward(&forward, 1.0).unwrap();
    assert!(grad.index_axis(Axis(0), 0).iter().all(|&g| g == 0.0));
    assert!(grad.iter().all(|g| g.is_finite()));
}

#[test]
fn test_worker_cap_does_not_change_results() {
    let scores = wavy_scores(6, 8, 4, 3.0);
    let targets: Vec<Vec<usize>> = (0..6).map(|b| vec![b % 3, (b + 1) % 3]).collect();
    let base = TransducerConfig::new().with_blank(true);

    let wide = transducer(&["a", "b", "c"], "abc", base.clone());
    let narrow = transducer(&["a", "b", "c"], "abc", base.with_max_workers(1));

    let wide_fwd = wide.forward(&scores.view(), &targets).unwrap();
    let narrow_fwd = narrow.forward(&scores.view(), &targets).unwrap();
    assert_eq!(wide_fwd.per_example(), narrow_fwd.per_example());

    let wide_grad: Array3<f64> = wide.backward(&wide_fwd, 1.0).unwrap();
    let narrow_grad = narrow.backward(&narrow_fwd, 1.0).unwrap();
    assert_eq!(wide_grad, narrow_grad);
}

#[test]
fn test_greedy_decode_drops_blank_after_collapsing() {
    let scores = Array2::from_shape_vec(
        (6, 3),
        vec![
            1.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ],
    )
    .unwrap();
    assert_eq!(greedy_decode(&scores.view(), Some(2)), vec![0, 0, 1]);
    assert_eq!(greedy_decode(&scores.view(), None), vec![0, 2, 0, 1, 2]);
}
