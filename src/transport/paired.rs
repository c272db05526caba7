use super::*;
use crate::Cost;
use crate::Mass;
use crate::Result;
use ndarray::Array2;

/// One-shot partial transport cost between two aligned distributions.
pub fn paired(cost: &Array2<Cost>, mu: &[Mass], nu: &[Mass], options: Options) -> Result<Cost> {
    PartialTransport::new(cost, options)?.cost(mu, nu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn is_paired_matching_instance() {
        let cost = array![[0., 2., 4.], [2., 0., 2.], [4., 2., 0.]];
        let mu = [1., 0., 2.];
        let nu = [0., 2., 1.];
        let options = Options::exact().penalty(Penalty::Fixed(0.5));
        let direct = PartialTransport::new(&cost, options).unwrap().cost(&mu, &nu).unwrap();
        assert_relative_eq!(paired(&cost, &mu, &nu, options).unwrap(), direct, epsilon = 1e-12);
    }

    #[test]
    fn is_paired_validated() {
        let cost = array![[0., 1.], [1., 0.]];
        let options = Options::default().mode(Mode::Relative);
        assert!(matches!(paired(&cost, &[1., 1.], &[1., 1.], options), Err(Error::Value(_))));
        assert!(matches!(paired(&cost, &[1.], &[1., 1.], Options::exact()), Err(Error::Shape(_))));
    }
}
