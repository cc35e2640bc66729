use predictive::PredictiveError;
use predictive::run;

fn main() -> Result<(), PredictiveError> {
    run(std::env::args().collect())
}
