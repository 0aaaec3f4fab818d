//! Word-Piece Alignment Example
//!
//! This example fits free per-frame scores to a target word with a
//! transducer loss whose tokens are word pieces, then decodes the result.
//! Several decompositions of the word compete during training; decoding shows
//! which one wins.

use scirs2_core::ndarray::Array3;
use std::collections::HashMap;
use tensorlogic_transducer::{
    char_tokens, Ctc, Reduction, SequenceLoss, Transducer, TransducerConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Word-Piece Transducer Example ===\n");

    let pieces = ["t", "h", "e", "th", "he", "the"];
    let tokens = char_tokens(&pieces);
    let graphemes: HashMap<char, usize> = [('t', 0), ('h', 1), ('e', 2)].into_iter().collect();

    let config = TransducerConfig::new()
        .with_blank(true)
        .with_reduction(Reduction::Mean);
    let transducer = Transducer::new(&tokens, &graphemes, config)?;

    println!(
        "Tokens: {:?} (+ blank at class {:?})",
        pieces,
        transducer.blank_index()
    );
    println!(
        "Lexicon: {} nodes, {} arcs",
        transducer.lexicon_graph().num_nodes(),
        transducer.lexicon_graph().num_arcs()
    );
    println!(
        "Token graph: {} nodes, {} arcs\n",
        transducer.token_graph().num_nodes(),
        transducer.token_graph().num_arcs()
    );

    // "the" as graphemes
    let targets = vec![vec![0, 1, 2]];
    let mut scores = Array3::<f64>::zeros((1, 6, transducer.num_classes()));

    println!("Fitting scores by gradient descent:");
    let learning_rate = 2.0;
    for step in 0..=40 {
        let forward = transducer.forward(&scores.view(), &targets)?;
        if step % 10 == 0 {
            println!("  step {:>2}: loss = {:.4}", step, forward.value());
        }
        let grad = transducer.backward(&forward, 1.0)?;
        scores.scaled_add(-learning_rate, &grad);
    }

    let decoded = transducer.decode(&scores.view())?;
    let words: Vec<&str> = decoded[0].iter().map(|&t| pieces[t]).collect();
    println!("\nDecoded token sequence: {:?}", words);
    println!("Spelled out: {}", words.concat());

    // The same machinery as plain CTC over the three graphemes.
    println!("\n=== CTC over graphemes ===\n");
    let ctc = Ctc::with_reduction(3, Reduction::Mean)?;
    let mut scores = Array3::<f64>::zeros((1, 6, ctc.num_classes()));
    for _ in 0..40 {
        let grad = ctc.gradient(&scores.view(), &targets)?;
        scores.scaled_add(-learning_rate, &grad);
    }
    println!("{}: loss = {:.4}", ctc.name(), ctc.compute(&scores.view(), &targets)?);
    println!("Greedy decode: {:?}", ctc.decode(&scores.view()));

    Ok(())
}
