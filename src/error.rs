// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use error_chain::error_chain;
use std::io;

error_chain! {
    foreign_links {
        Io(io::Error);
    }

    errors {
        /// A parameter was out of range, or a required input (cloud, KNN
        /// backend) was never bound.
        InvalidArgument(msg: String) {
            description("invalid argument")
            display("invalid argument: {}", msg)
        }

        /// An operation that is not meaningful on an empty input was
        /// requested (most feature extractors instead return an empty
        /// result; this is reserved for operations that cannot do that,
        /// such as RANSAC or 4PCS).
        EmptyInput(msg: String) {
            description("empty input")
            display("empty input: {}", msg)
        }

        /// An iterative aligner exhausted its budget without meeting its
        /// convergence criteria.
        NotConverged(msg: String) {
            description("did not converge")
            display("did not converge: {}", msg)
        }

        /// RANSAC or 4PCS failed to find a candidate meeting the minimum
        /// inlier count.
        NoSolution(msg: String) {
            description("no solution found")
            display("no solution found: {}", msg)
        }

        /// A singular covariance, non-finite SVD, or similar numerical
        /// breakdown occurred; the caller is expected to retry with
        /// different parameters.
        NumericalFailure(msg: String) {
            description("numerical failure")
            display("numerical failure: {}", msg)
        }

        /// The thread pool's stop flag is set; it no longer accepts tasks.
        ShuttingDown {
            description("thread pool is shutting down")
            display("thread pool is shutting down")
        }

        /// Internal task/result channel plumbing failed (worker panicked,
        /// receiver dropped before the task ran, and so on).
        Channel(msg: String) {
            description("internal channel failure")
            display("internal channel failure: {}", msg)
        }
    }
}
