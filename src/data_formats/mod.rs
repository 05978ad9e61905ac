pub mod npz;

pub use npz::{
    read_meld, read_meld_npz, read_sentiment, read_sentiment_npz, write_meld, write_meld_npz,
    write_sentiment, write_sentiment_npz,
};
