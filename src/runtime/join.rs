/// Parallel-gateway join barrier
///
/// `arrived` counts every row recorded for the gateway in the instance,
/// including rounds already completed by a loop. A round is complete when the
/// count reaches the incoming-edge count, or any exact multiple of it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    /// Last sibling of this round arrived; fork the outgoing flows
    Fire,
    /// Siblings still outstanding; persist this arrival and stop
    Wait,
}

pub fn decide(arrived: i64, incoming: usize) -> JoinDecision {
    let incoming = incoming as i64;
    if arrived == incoming {
        return JoinDecision::Fire;
    }
    if arrived > incoming && incoming != 0 && arrived % incoming == 0 {
        return JoinDecision::Fire;
    }
    JoinDecision::Wait
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_through_a_loop() {
        let sequence: Vec<JoinDecision> = (1..=6).map(|arrived| decide(arrived, 2)).collect();
        assert_eq!(
            sequence,
            vec![
                JoinDecision::Wait,
                JoinDecision::Fire,
                JoinDecision::Wait,
                JoinDecision::Fire,
                JoinDecision::Wait,
                JoinDecision::Fire,
            ]
        );
    }

    #[test]
    fn test_single_incoming_always_fires() {
        assert!((1..5).all(|arrived| decide(arrived, 1) == JoinDecision::Fire));
    }

    #[test]
    fn test_three_way_join() {
        assert_eq!(decide(2, 3), JoinDecision::Wait);
        assert_eq!(decide(3, 3), JoinDecision::Fire);
        assert_eq!(decide(4, 3), JoinDecision::Wait);
        assert_eq!(decide(6, 3), JoinDecision::Fire);
    }

    #[test]
    fn test_no_incoming_edges() {
        assert_eq!(decide(0, 0), JoinDecision::Fire);
        assert_eq!(decide(1, 0), JoinDecision::Wait);
    }
}
