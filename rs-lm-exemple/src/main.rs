use rs_lm_core::corpus::Corpus;
use rs_lm_core::model::counts::Sentinels;
use rs_lm_core::model::language_model::NGramLanguageModel;
use rs_lm_core::model::probability::Smoothing;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A tiny in-memory corpus; real runs load a tagged corpus through
    // CorpusBuilder and cache the counts on disk.
    let train: Vec<Vec<String>> = [
        "the cat sat on the mat",
        "the dog sat on the rug",
        "the cat chased the dog",
        "a dog chased a cat",
    ]
    .iter()
    .map(|s| s.split_whitespace().map(str::to_owned).collect())
    .collect();

    let corpus = Corpus::from_sentences(train, Vec::new());

    // A bigram model with raw maximum-likelihood probabilities.
    // Unseen bigrams score as impossible (log-probability -inf).
    let raw = NGramLanguageModel::new(2, Smoothing::Raw, corpus.clone(), Sentinels::default())?;
    println!("{}", raw);
    println!("log P(\"the cat sat on the mat\") = {}", raw.text_log_prob("the cat sat on the mat"));
    println!("log P(\"the mat sat\")            = {}", raw.text_log_prob("the mat sat"));

    // Laplace smoothing reserves mass for unseen bigrams, so nothing
    // is impossible anymore; a larger k flattens the distribution.
    let laplace =
        NGramLanguageModel::new(2, Smoothing::Laplace { k: 1 }, corpus.clone(), Sentinels::default())?;
    println!("{}", laplace);
    println!("Perplexity of \"the cat sat\":  {}", laplace.perplexity_str("the cat sat"));
    println!("Perplexity of \"sat cat the\":  {}", laplace.perplexity_str("sat cat the"));

    // Unscrambling searches every permutation of the token positions
    // for the most probable arrangement (factorial in length, so keep
    // the sentences short).
    let discount =
        NGramLanguageModel::new(2, Smoothing::AbsoluteDiscount { d: 0.3 }, corpus, Sentinels::default())?;
    for scrambled in ["mat the on sat cat the", "dog the chased cat the"] {
        println!("\"{}\" -> \"{}\"", scrambled, discount.unscramble(scrambled));
    }

    Ok(())
}
