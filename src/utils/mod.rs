pub use sequence::SequenceGenerator;

mod sequence;
