mod integrals;
mod joint;
mod sampling;
