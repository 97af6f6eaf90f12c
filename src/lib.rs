//! Passive subdomain inventory: certificate transparency and wordlist
//! candidates, resolved under a concurrency cap and classified against
//! published CDN edge ranges.

pub mod classify;
pub mod cli;
pub mod ct;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod options;
pub mod output;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod scanner;

pub use classify::{CidrBlock, EdgeRanges};
pub use ct::CtDiscoverer;
pub use discovery::Wordlist;
pub use error::{CtError, LookupError, RangeError, ScanError};
pub use normalize::{Candidate, Source};
pub use report::{ClassifiedResult, ScanReport, ScanStats};
pub use resolver::{AddressLookup, ResolutionRecord, Resolver, SystemLookup};
pub use scanner::Scanner;
